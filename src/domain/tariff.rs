use serde::{Deserialize, Serialize};

use super::types::ClockTime;

/// Two-tier electricity tariff with a recurring daily cheap window.
///
/// The window may wrap midnight (`cheap_start` later in the day than
/// `cheap_end`), which is the common overnight configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TariffWindow {
    pub cheap_start: ClockTime,
    pub cheap_end: ClockTime,
    pub cheap_rate_per_kwh: f64,
    pub standard_rate_per_kwh: f64,
}

impl TariffWindow {
    pub fn cheap_start_minute(&self) -> u16 {
        self.cheap_start.minute_of_day()
    }

    pub fn cheap_end_minute(&self) -> u16 {
        self.cheap_end.minute_of_day()
    }

    /// True when the window spans midnight
    pub fn wraps_midnight(&self) -> bool {
        self.cheap_start_minute() > self.cheap_end_minute()
    }
}
