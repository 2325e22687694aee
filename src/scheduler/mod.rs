pub mod clock;
pub mod energy;
pub mod planner;

pub use energy::CostSplit;
pub use planner::{plan_charge, ChargePlan, PlanMode};
