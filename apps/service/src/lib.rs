//! urlwatch service: a registry of URL monitors and the scheduler that
//! probes them.
//!
//! The HTTP management API lives in the `urlwatch-server` app; everything it
//! needs is reachable through [`Orchestrator`] and [`MonitorService`].

pub mod config;
pub mod database;
pub mod models;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use models::{Monitor, MonitorId};
pub use orchestrator::{Orchestrator, StartupError};
pub use service::{MonitorService, ServiceError};
