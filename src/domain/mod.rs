pub mod battery;
pub mod notify;
pub mod tariff;
pub mod types;
pub mod vehicle;

pub use battery::{BatteryProfile, BatteryProfileCache};
pub use notify::{BufferedNotifier, Notifier, NotifyLevel, TracingNotifier};
pub use tariff::TariffWindow;
pub use types::{ChargeTarget, ClockTime, DomainError, MINUTES_PER_DAY};
pub use vehicle::{Vehicle, VehicleCommand, VehicleError, VehicleMetrics};

#[cfg(feature = "sim")]
pub use vehicle::SimulatedVehicle;
