use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::vehicle::VehicleMetrics;

/// Plausibility bounds for telemetry-reported battery parameters.
/// Values outside these ranges are discarded in favour of defaults.
const CAPACITY_RANGE_KWH: std::ops::RangeInclusive<f64> = 10.0..=250.0;
const SOH_RANGE_PERCENT: std::ops::RangeInclusive<f64> = 50.0..=100.0;

/// Battery parameters used for energy arithmetic.
///
/// Immutable per calculation; refreshed from vehicle telemetry on a cache
/// interval and falling back to configured defaults when telemetry is
/// absent or implausible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatteryProfile {
    pub nominal_capacity_kwh: f64,
    pub state_of_health_percent: f64,
}

impl BatteryProfile {
    /// Capacity the battery can actually hold, adjusted for degradation
    pub fn usable_capacity_kwh(&self) -> f64 {
        self.nominal_capacity_kwh * self.state_of_health_percent / 100.0
    }
}

impl Default for BatteryProfile {
    fn default() -> Self {
        Self {
            nominal_capacity_kwh: 40.0,
            state_of_health_percent: 100.0,
        }
    }
}

/// Telemetry-backed battery profile with a refresh interval.
///
/// Between refreshes the cached profile is served unchanged, so a single
/// schedule calculation always sees one consistent profile.
#[derive(Debug)]
pub struct BatteryProfileCache {
    defaults: BatteryProfile,
    current: BatteryProfile,
    refreshed_at: Option<DateTime<Utc>>,
    ttl: Duration,
}

impl BatteryProfileCache {
    pub fn new(defaults: BatteryProfile) -> Self {
        Self {
            defaults,
            current: defaults,
            refreshed_at: None,
            ttl: Duration::seconds(60),
        }
    }

    pub fn profile(&self) -> BatteryProfile {
        self.current
    }

    /// Refresh the profile from a telemetry snapshot if the cache expired.
    ///
    /// Each field falls back to its configured default independently when
    /// the metric is missing or outside its plausibility range.
    pub fn refresh(&mut self, now: DateTime<Utc>, metrics: &VehicleMetrics) {
        if let Some(at) = self.refreshed_at {
            if now - at < self.ttl {
                return;
            }
        }

        let capacity = match metrics.battery_capacity_kwh {
            Some(kwh) if CAPACITY_RANGE_KWH.contains(&kwh) => kwh,
            Some(kwh) => {
                debug!(reported_kwh = kwh, "implausible battery capacity, using default");
                self.defaults.nominal_capacity_kwh
            }
            None => self.defaults.nominal_capacity_kwh,
        };

        let soh = match metrics.state_of_health_percent {
            Some(pct) if SOH_RANGE_PERCENT.contains(&pct) => pct,
            Some(pct) => {
                debug!(reported_percent = pct, "implausible state of health, using default");
                self.defaults.state_of_health_percent
            }
            None => self.defaults.state_of_health_percent,
        };

        self.current = BatteryProfile {
            nominal_capacity_kwh: capacity,
            state_of_health_percent: soh,
        };
        self.refreshed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(capacity: Option<f64>, soh: Option<f64>) -> VehicleMetrics {
        VehicleMetrics {
            battery_capacity_kwh: capacity,
            state_of_health_percent: soh,
            ..Default::default()
        }
    }

    #[test]
    fn test_usable_capacity() {
        let profile = BatteryProfile {
            nominal_capacity_kwh: 40.0,
            state_of_health_percent: 90.0,
        };
        assert!((profile.usable_capacity_kwh() - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_takes_plausible_telemetry() {
        let mut cache = BatteryProfileCache::new(BatteryProfile::default());
        let now = Utc::now();
        cache.refresh(now, &metrics(Some(62.0), Some(94.0)));
        let p = cache.profile();
        assert_eq!(p.nominal_capacity_kwh, 62.0);
        assert_eq!(p.state_of_health_percent, 94.0);
    }

    #[test]
    fn test_refresh_rejects_implausible_telemetry() {
        let mut cache = BatteryProfileCache::new(BatteryProfile::default());
        let now = Utc::now();
        cache.refresh(now, &metrics(Some(500.0), Some(12.0)));
        let p = cache.profile();
        assert_eq!(p.nominal_capacity_kwh, 40.0);
        assert_eq!(p.state_of_health_percent, 100.0);
    }

    #[test]
    fn test_refresh_respects_ttl() {
        let mut cache = BatteryProfileCache::new(BatteryProfile::default());
        let now = Utc::now();
        cache.refresh(now, &metrics(Some(62.0), None));
        // Within the TTL the newer reading is ignored.
        cache.refresh(now + Duration::seconds(30), &metrics(Some(70.0), None));
        assert_eq!(cache.profile().nominal_capacity_kwh, 62.0);
        // After the TTL it is picked up.
        cache.refresh(now + Duration::seconds(61), &metrics(Some(70.0), None));
        assert_eq!(cache.profile().nominal_capacity_kwh, 70.0);
    }

    #[test]
    fn test_absent_telemetry_uses_defaults() {
        let mut cache = BatteryProfileCache::new(BatteryProfile::default());
        cache.refresh(Utc::now(), &metrics(None, None));
        let p = cache.profile();
        assert_eq!(p.nominal_capacity_kwh, 40.0);
        assert_eq!(p.state_of_health_percent, 100.0);
    }
}
