//! Energy and cost arithmetic for a single charge session.

use anyhow::{ensure, Result};
use serde::Serialize;

use super::clock::{normalize_relative_to, window_duration_minutes};
use crate::domain::tariff::TariffWindow;
use crate::domain::types::MINUTES_PER_DAY;

/// Energy required to move the battery from `current` to `target` SoC.
/// Zero when the target is already met; callers treat zero as "skip".
pub fn energy_needed_kwh(current_soc: f64, target_soc: f64, usable_capacity_kwh: f64) -> f64 {
    ((target_soc - current_soc) / 100.0 * usable_capacity_kwh).max(0.0)
}

/// Hours to deliver `kwh` at the configured charge rate
pub fn charge_duration_hours(kwh: f64, charge_rate_kw: f64) -> Result<f64> {
    ensure!(
        charge_rate_kw > 0.0,
        "charge rate must be positive, got {charge_rate_kw} kW"
    );
    Ok(kwh / charge_rate_kw)
}

/// How a charge interval splits across the tariff tiers
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CostSplit {
    /// Hours before the cheap window opens, priced at the standard rate
    pub pre_window_hours: f64,
    /// Hours inside the cheap window
    pub cheap_hours: f64,
    /// Hours after the cheap window closes, priced at the standard rate
    pub post_window_hours: f64,
    pub total_cost: f64,
}

impl CostSplit {
    pub fn overflow_hours(&self) -> f64 {
        self.pre_window_hours + self.post_window_hours
    }
}

/// Price a charge session of `duration_minutes` starting at minute-of-day
/// `start_minute`.
///
/// The session is intersected with the single cheap-window instance nearest
/// the start: the instance already containing the start, or failing that the
/// next one to open. Charge time beyond that one instance is priced at the
/// standard rate; multi-day sessions spanning several window instances are
/// not modelled.
pub fn split_cost(
    start_minute: u16,
    duration_minutes: i64,
    charge_rate_kw: f64,
    tariff: &TariffWindow,
) -> Result<CostSplit> {
    ensure!(
        charge_rate_kw > 0.0,
        "charge rate must be positive, got {charge_rate_kw} kW"
    );
    ensure!(duration_minutes >= 0, "negative charge duration");

    let window_len = i64::from(window_duration_minutes(
        tariff.cheap_start_minute(),
        tariff.cheap_end_minute(),
    ));

    // Linear timeline with the session start at 0. Projecting the window
    // start relative to the session start gives the most recent instance;
    // if even that one ends before the session begins, the next instance
    // (a day later) is the relevant one.
    let prev_start = i64::from(normalize_relative_to(
        tariff.cheap_start_minute(),
        start_minute,
    )) - i64::from(start_minute);
    let window_start = if prev_start + window_len > 0 {
        prev_start
    } else {
        prev_start + i64::from(MINUTES_PER_DAY)
    };
    let window_end = window_start + window_len;

    let cheap = (duration_minutes.min(window_end) - window_start.max(0)).max(0);
    let pre = window_start.clamp(0, duration_minutes);
    let post = duration_minutes - pre - cheap;

    let pre_window_hours = pre as f64 / 60.0;
    let cheap_hours = cheap as f64 / 60.0;
    let post_window_hours = post as f64 / 60.0;

    let total_cost = charge_rate_kw
        * (cheap_hours * tariff.cheap_rate_per_kwh
            + (pre_window_hours + post_window_hours) * tariff.standard_rate_per_kwh);

    Ok(CostSplit {
        pre_window_hours,
        cheap_hours,
        post_window_hours,
        total_cost,
    })
}
