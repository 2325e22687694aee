use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Vehicle-specific errors
#[derive(Debug, Error)]
pub enum VehicleError {
    #[error("Communication error: {0}")]
    Communication(String),
    #[error("Vehicle offline or unavailable")]
    Offline,
    #[error("Command not supported: {0}")]
    NotSupported(String),
}

/// Fire-and-forget commands the controller can issue.
///
/// A successful return only means the command was dispatched; whether it
/// took effect is confirmed by the next telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    ChargeStart,
    ChargeStop,
    ClimateOn,
    ClimateOff,
}

impl std::fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VehicleCommand::ChargeStart => write!(f, "charge-start"),
            VehicleCommand::ChargeStop => write!(f, "charge-stop"),
            VehicleCommand::ClimateOn => write!(f, "climate-on"),
            VehicleCommand::ClimateOff => write!(f, "climate-off"),
        }
    }
}

/// Raw telemetry as reported by the vehicle. Every field is optional;
/// absence degrades to a documented default downstream, never an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct VehicleMetrics {
    pub soc_percent: Option<f64>,
    pub charging: Option<bool>,
    pub plugged_in: Option<bool>,
    pub battery_capacity_kwh: Option<f64>,
    pub state_of_health_percent: Option<f64>,
}

/// Vehicle telemetry and command surface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Vehicle: Send + Sync {
    async fn read_metrics(&self) -> Result<VehicleMetrics>;
    async fn execute(&self, command: VehicleCommand) -> Result<()>;
}

#[cfg(feature = "sim")]
pub use sim::SimulatedVehicle;

#[cfg(feature = "sim")]
mod sim {
    use chrono::{DateTime, Utc};
    use rand::Rng;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct SimState {
        soc_percent: f64,
        charging: bool,
        plugged_in: bool,
        climate_on: bool,
        last_read: DateTime<Utc>,
    }

    /// In-process vehicle stand-in so the binary runs without hardware.
    ///
    /// Charging raises SoC continuously at the configured rate; telemetry
    /// reads carry a little jitter on the state-of-health figure.
    pub struct SimulatedVehicle {
        capacity_kwh: f64,
        charge_rate_kw: f64,
        state: RwLock<SimState>,
    }

    impl SimulatedVehicle {
        pub fn new(capacity_kwh: f64, charge_rate_kw: f64, initial_soc_percent: f64) -> Self {
            Self {
                capacity_kwh,
                charge_rate_kw,
                state: RwLock::new(SimState {
                    soc_percent: initial_soc_percent,
                    charging: false,
                    plugged_in: true,
                    climate_on: false,
                    last_read: Utc::now(),
                }),
            }
        }

        pub async fn set_plugged_in(&self, plugged_in: bool) {
            let mut state = self.state.write().await;
            state.plugged_in = plugged_in;
            if !plugged_in {
                state.charging = false;
            }
        }

        fn advance(&self, state: &mut SimState, now: DateTime<Utc>) {
            let elapsed_hours = (now - state.last_read).num_milliseconds() as f64 / 3_600_000.0;
            state.last_read = now;
            if state.charging && elapsed_hours > 0.0 {
                let added_kwh = self.charge_rate_kw * elapsed_hours;
                state.soc_percent =
                    (state.soc_percent + added_kwh / self.capacity_kwh * 100.0).min(100.0);
                if state.soc_percent >= 100.0 {
                    state.charging = false;
                }
            }
        }
    }

    #[async_trait]
    impl Vehicle for SimulatedVehicle {
        async fn read_metrics(&self) -> Result<VehicleMetrics> {
            let mut state = self.state.write().await;
            let now = Utc::now();
            self.advance(&mut state, now);
            let soh_jitter = rand::thread_rng().gen_range(-0.2..0.2);
            Ok(VehicleMetrics {
                soc_percent: Some(state.soc_percent),
                charging: Some(state.charging),
                plugged_in: Some(state.plugged_in),
                battery_capacity_kwh: Some(self.capacity_kwh),
                state_of_health_percent: Some(98.0 + soh_jitter),
            })
        }

        async fn execute(&self, command: VehicleCommand) -> Result<()> {
            let mut state = self.state.write().await;
            let now = Utc::now();
            self.advance(&mut state, now);
            match command {
                VehicleCommand::ChargeStart => {
                    if !state.plugged_in {
                        anyhow::bail!(VehicleError::NotSupported(
                            "cannot charge while unplugged".to_string()
                        ));
                    }
                    state.charging = true;
                }
                VehicleCommand::ChargeStop => state.charging = false,
                VehicleCommand::ClimateOn => state.climate_on = true,
                VehicleCommand::ClimateOff => state.climate_on = false,
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_charge_start_requires_plug() {
            let vehicle = SimulatedVehicle::new(40.0, 7.0, 50.0);
            vehicle.set_plugged_in(false).await;
            assert!(vehicle.execute(VehicleCommand::ChargeStart).await.is_err());

            vehicle.set_plugged_in(true).await;
            assert!(vehicle.execute(VehicleCommand::ChargeStart).await.is_ok());
            let metrics = vehicle.read_metrics().await.unwrap();
            assert_eq!(metrics.charging, Some(true));
        }

        #[tokio::test]
        async fn test_unplug_stops_charging() {
            let vehicle = SimulatedVehicle::new(40.0, 7.0, 50.0);
            vehicle.execute(VehicleCommand::ChargeStart).await.unwrap();
            vehicle.set_plugged_in(false).await;
            let metrics = vehicle.read_metrics().await.unwrap();
            assert_eq!(metrics.charging, Some(false));
            assert_eq!(metrics.plugged_in, Some(false));
        }
    }
}
