//! Configuration types for the simulator.

use eventpass_pool::{ConfigError, PoolConfig};
use eventpass_spike::LocalCluster;
use std::time::Duration;

/// Configuration for a multi-rank run.
#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Number of ranks, each run on its own thread.
    pub ranks: u32,

    /// Configuration shared by every rank's pool.
    pub pool: PoolConfig,

    /// How long a rank waits on a peer inside a collective before failing.
    pub timeout: Duration,
}

impl SimulatorConfig {
    pub fn new(ranks: u32, pool: PoolConfig) -> Self {
        Self {
            ranks,
            pool,
            timeout: LocalCluster::DEFAULT_TIMEOUT,
        }
    }

    /// Set the collective timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total cell groups across all ranks.
    pub fn total_cell_groups(&self) -> u64 {
        self.ranks as u64 * self.pool.cell_groups as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate(self.ranks)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new(4, PoolConfig::default())
    }
}
