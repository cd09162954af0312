pub mod monitor;

pub use monitor::{Activity, Monitor, MonitorId, now};
