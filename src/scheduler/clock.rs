//! Minute-of-day arithmetic for possibly-overnight windows.
//!
//! Every window test in the crate goes through [`is_within_window`]; the
//! day-wrap branch lives here and nowhere else.

use crate::domain::types::{ClockTime, MINUTES_PER_DAY};

const DAY: i32 = MINUTES_PER_DAY as i32;

/// Convert an hour/minute pair to its offset from midnight
pub fn minute_of_day(hour: u32, minute: u32) -> u16 {
    debug_assert!(hour < 24 && minute < 60);
    (hour * 60 + minute) as u16
}

/// Inverse of [`minute_of_day`]
pub fn clock_time(minute_of_day: u16) -> ClockTime {
    debug_assert!(minute_of_day < MINUTES_PER_DAY);
    ClockTime {
        hour: u32::from(minute_of_day) / 60,
        minute: u32::from(minute_of_day) % 60,
    }
}

/// Window membership, inclusive at `start` and exclusive at `end`.
///
/// When `start > end` the window wraps midnight and membership is
/// `now >= start || now < end`. A zero-length window (`start == end`)
/// contains nothing.
pub fn is_within_window(now: u16, start: u16, end: u16) -> bool {
    if start > end {
        now >= start || now < end
    } else {
        now >= start && now < end
    }
}

/// Window length in hours, always in `[0, 24)`.
///
/// `start == end` is treated as a zero-length window: the duration is 0 and
/// no minute is ever inside it (consistent with [`is_within_window`]).
pub fn window_duration_hours(start: u16, end: u16) -> f64 {
    f64::from(window_duration_minutes(start, end)) / 60.0
}

/// Window length in whole minutes
pub fn window_duration_minutes(start: u16, end: u16) -> u16 {
    (((i32::from(end) - i32::from(start)) + DAY) % DAY) as u16
}

/// Project `time` onto the linear timeline that ends at `reference`.
///
/// Times later in the day than the reference are taken to be yesterday's
/// occurrence (shifted back 24 h), so any two normalized times compare
/// without day-wrap case analysis.
pub fn normalize_relative_to(time: u16, reference: u16) -> i32 {
    if time > reference {
        i32::from(time) - DAY
    } else {
        i32::from(time)
    }
}

/// Minutes from `now` until the next occurrence of `target`.
/// Zero when `target == now` (the occurrence is "right now").
pub fn minutes_until(now: u16, target: u16) -> i64 {
    i64::from(((i32::from(target) - i32::from(now)) + DAY) % DAY)
}

/// Minutes from `now` until the next strictly-future occurrence of
/// `target`; `target == now` maps to a full day ahead.
pub fn minutes_until_future(now: u16, target: u16) -> i64 {
    let until = minutes_until(now, target);
    if until == 0 { i64::from(DAY) } else { until }
}

/// Wrap a linear minute offset back into `0..1440`
pub fn wrap_minute(minute: i64) -> u16 {
    (minute.rem_euclid(i64::from(DAY))) as u16
}
