use std::io::Error as IoError;

use thiserror::Error;
use urlwatch_service::{StartupError, config};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
    #[error("Startup failed: {0}")]
    Startup(#[from] StartupError),
}
