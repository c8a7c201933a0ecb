//! Runtime errors

use crate::config::ConfigError;
use dg_detection::{BeaconError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to initialise logging: {0}")]
    Telemetry(String),

    #[error("Failed to open state store: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid beacon node endpoint: {0}")]
    Beacon(#[from] BeaconError),

    #[error("Storage backend '{0}' is not compiled in")]
    BackendUnavailable(&'static str),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
