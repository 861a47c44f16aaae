//! Simulator errors.

use eventpass_pool::{ConfigError, PoolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Rank {rank} failed: {source}")]
    Pool {
        rank: u32,
        #[source]
        source: PoolError,
    },

    #[error("Rank {0} panicked")]
    RankPanicked(u32),

    #[error("Failed to spawn rank thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimulatorError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SimulatorError::Config(_) => 2,
            SimulatorError::Pool { source, .. } if source.is_config() => 2,
            _ => 1,
        }
    }
}
