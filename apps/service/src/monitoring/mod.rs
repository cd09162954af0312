/// Monitoring engine module - decides when to check and performs checks
///
/// This module is responsible for:
/// - Executing HTTP checks against monitor URLs
/// - Scheduling due monitors on a fixed tick
/// - Reporting outcomes to observers
pub mod checker;
pub mod executor;
pub mod observer;
pub mod scheduler;
pub mod types;
pub mod validation;

pub use executor::MonitoringExecutor;
pub use scheduler::{MonitoringScheduler, SchedulerHandle, SchedulerSettings};
pub use types::CheckOutcome;
