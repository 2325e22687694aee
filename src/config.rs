use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;

use crate::domain::tariff::TariffWindow;
use crate::domain::types::ClockTime;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub controller: ControllerConfig,
    pub battery: BatteryConfig,
    pub charger: ChargerConfig,
    pub tariff: TariffConfig,
    pub target: TargetConfig,
    pub settings: SettingsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Tick interval driving scheduling and recovery; all deferred delays
    /// are honoured at this granularity
    pub tick_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatteryConfig {
    /// Fallback pack size when telemetry does not report one
    pub nominal_capacity_kwh: f64,
    /// Fallback state of health when telemetry does not report one
    pub default_soh_percent: f64,
    /// Starting SoC for the simulated vehicle
    pub initial_soc_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargerConfig {
    pub charge_rate_kw: f64,
}

/// Two-tier tariff defaults; overridden by persisted user settings
#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    pub cheap_start: String,
    pub cheap_end: String,
    pub cheap_rate_per_kwh: f64,
    pub standard_rate_per_kwh: f64,
}

impl TariffConfig {
    pub fn window(&self) -> Result<TariffWindow> {
        Ok(TariffWindow {
            cheap_start: self.cheap_start.parse::<ClockTime>()?,
            cheap_end: self.cheap_end.parse::<ClockTime>()?,
            cheap_rate_per_kwh: self.cheap_rate_per_kwh,
            standard_rate_per_kwh: self.standard_rate_per_kwh,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub target_soc_percent: f64,
    /// "HH:MM" deadline, or absent for cost-only scheduling
    pub ready_by: Option<String>,
}

impl TargetConfig {
    pub fn ready_by(&self) -> Result<Option<ClockTime>> {
        self.ready_by
            .as_deref()
            .map(|s| s.parse::<ClockTime>().map_err(Into::into))
            .transpose()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    /// Where user settings are persisted between restarts
    pub path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("OCC__").split("__"));
        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tariff_config_parses_window() {
        let cfg = TariffConfig {
            cheap_start: "23:30".to_string(),
            cheap_end: "05:30".to_string(),
            cheap_rate_per_kwh: 0.075,
            standard_rate_per_kwh: 0.30,
        };
        let window = cfg.window().unwrap();
        assert!(window.wraps_midnight());
        assert_eq!(window.cheap_start_minute(), 1410);
    }

    #[test]
    fn test_tariff_config_rejects_garbage() {
        let cfg = TariffConfig {
            cheap_start: "25:00".to_string(),
            cheap_end: "05:30".to_string(),
            cheap_rate_per_kwh: 0.075,
            standard_rate_per_kwh: 0.30,
        };
        assert!(cfg.window().is_err());
    }

    #[test]
    fn test_ready_by_optional() {
        let cfg = TargetConfig {
            target_soc_percent: 80.0,
            ready_by: None,
        };
        assert!(cfg.ready_by().unwrap().is_none());

        let cfg = TargetConfig {
            target_soc_percent: 80.0,
            ready_by: Some("07:30".to_string()),
        };
        assert_eq!(cfg.ready_by().unwrap(), Some(ClockTime::new(7, 30).unwrap()));
    }
}
