//! Pool errors.

use crate::ConfigError;
use eventpass_spike::TransportError;
use thiserror::Error;

/// Errors that stop a pool. All of them end the run.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Spike exchange failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to build worker threads: {0}")]
    ThreadPool(String),

    #[error("Failed to create exchange latency histogram: {0}")]
    Histogram(String),
}

impl PoolError {
    /// Whether the error was caught before the simulation started.
    pub fn is_config(&self) -> bool {
        matches!(self, PoolError::Config(_))
    }
}
