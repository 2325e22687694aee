use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a day; all minute-of-day values live in `0..MINUTES_PER_DAY`.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Validation errors for user-supplied times and percentages
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid hour: {0} (expected 0-23)")]
    InvalidHour(u32),
    #[error("Invalid minute: {0} (expected 0-59)")]
    InvalidMinute(u32),
    #[error("Invalid time format: {0} (expected HH:MM)")]
    InvalidTimeFormat(String),
    #[error("Target SoC out of range: {0}% (expected 20-100)")]
    TargetSocOutOfRange(f64),
}

/// A wall-clock time of day (no date component)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u32,
    pub minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self, DomainError> {
        if hour > 23 {
            return Err(DomainError::InvalidHour(hour));
        }
        if minute > 59 {
            return Err(DomainError::InvalidMinute(minute));
        }
        Ok(Self { hour, minute })
    }

    /// Offset from midnight in minutes, always in `0..1440`
    pub fn minute_of_day(&self) -> u16 {
        (self.hour * 60 + self.minute) as u16
    }
}

impl std::str::FromStr for ClockTime {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| DomainError::InvalidTimeFormat(s.to_string()))?;
        let hour = h
            .parse::<u32>()
            .map_err(|_| DomainError::InvalidTimeFormat(s.to_string()))?;
        let minute = m
            .parse::<u32>()
            .map_err(|_| DomainError::InvalidTimeFormat(s.to_string()))?;
        Self::new(hour, minute)
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// What the next charge session should achieve.
///
/// `target_soc_percent` is absolute: once a session starts it runs until the
/// target is reached, never partially.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChargeTarget {
    pub current_soc_percent: f64,
    pub target_soc_percent: f64,
    pub ready_by: Option<ClockTime>,
}

/// Validate a user-supplied target SoC (20-100%)
pub fn validate_target_soc(percent: f64) -> Result<f64, DomainError> {
    if !(20.0..=100.0).contains(&percent) {
        return Err(DomainError::TargetSocOutOfRange(percent));
    }
    Ok(percent)
}
