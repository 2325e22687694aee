//! Schedule optimizer: picks the single best start time for the next
//! charge session against the cheap-rate window and an optional ready-by
//! deadline.
//!
//! Policy priority is strict: reaching the target SoC by the deadline
//! outranks minimizing cost. Cost is always reported, never a reason to
//! refuse or delay a required charge.

use anyhow::Result;
use serde::Serialize;

use super::clock::{is_within_window, minutes_until, minutes_until_future, wrap_minute};
use super::energy::{charge_duration_hours, energy_needed_kwh, split_cost};
use crate::domain::tariff::TariffWindow;
use crate::domain::types::ChargeTarget;

/// How the planned session relates to the cheap window and the deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlanMode {
    /// Starting at the cheap-window start meets the deadline (or there is
    /// no deadline)
    FitsWindow,
    /// The session must begin before the cheap window opens to make the
    /// deadline
    StartsEarly,
    /// The deadline is unreachable even starting immediately; charging
    /// must begin now regardless of tariff
    Emergency,
}

/// A computed charge schedule. Recomputed on every plug-in and schedule
/// check, never mutated in place.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChargePlan {
    pub kwh_needed: f64,
    pub hours_needed: f64,
    /// Minute-of-day the session should start
    pub start_minute: u16,
    /// Minute-of-day the session is expected to end (may wrap past midnight)
    pub end_minute: u16,
    pub mode: PlanMode,
    /// Session hours priced at the cheap rate
    pub cheap_hours: f64,
    /// Session hours outside the cheap window, priced at the standard rate
    pub overflow_hours: f64,
    /// Slack between expected end and the deadline, when a deadline exists
    pub buffer_hours: Option<f64>,
    pub total_cost: f64,
}

/// Compute the best start for the next charge session.
///
/// Returns `Ok(None)` when no charging is required (target already met).
/// `now_minute` is the current wall-clock minute-of-day; all window and
/// deadline occurrences are resolved relative to it.
pub fn plan_charge(
    now_minute: u16,
    target: &ChargeTarget,
    tariff: &TariffWindow,
    charge_rate_kw: f64,
    usable_capacity_kwh: f64,
) -> Result<Option<ChargePlan>> {
    let kwh_needed = energy_needed_kwh(
        target.current_soc_percent,
        target.target_soc_percent,
        usable_capacity_kwh,
    );
    if kwh_needed <= 0.0 {
        return Ok(None);
    }

    let hours_needed = charge_duration_hours(kwh_needed, charge_rate_kw)?;
    // Always round up; under-provisioning the session would miss the target.
    let minutes_needed = (hours_needed * 60.0).ceil() as i64;

    // Linear timeline in minutes from now. When now is already inside the
    // cheap window the candidate start is now, not tomorrow's window start.
    let window_start = if is_within_window(
        now_minute,
        tariff.cheap_start_minute(),
        tariff.cheap_end_minute(),
    ) {
        0
    } else {
        minutes_until(now_minute, tariff.cheap_start_minute())
    };
    let deadline = target
        .ready_by
        .map(|t| minutes_until_future(now_minute, t.minute_of_day()));

    let (start_offset, mode, buffer_hours) = match deadline {
        None => (window_start, PlanMode::FitsWindow, None),
        Some(deadline) => {
            let window_end = window_start + minutes_needed;
            if window_end <= deadline {
                (
                    window_start,
                    PlanMode::FitsWindow,
                    Some((deadline - window_end) as f64 / 60.0),
                )
            } else {
                let forced_start = deadline - minutes_needed;
                if forced_start <= 0 {
                    // Already too late; the only valid start is "now".
                    (0, PlanMode::Emergency, None)
                } else {
                    (forced_start, PlanMode::StartsEarly, None)
                }
            }
        }
    };

    let start_minute = wrap_minute(i64::from(now_minute) + start_offset);
    let end_minute = wrap_minute(i64::from(start_minute) + minutes_needed);
    let split = split_cost(start_minute, minutes_needed, charge_rate_kw, tariff)?;

    Ok(Some(ChargePlan {
        kwh_needed,
        hours_needed,
        start_minute,
        end_minute,
        mode,
        cheap_hours: split.cheap_hours,
        overflow_hours: split.overflow_hours(),
        buffer_hours,
        total_cost: split.total_cost,
    }))
}
