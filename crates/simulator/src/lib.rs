//! Multi-rank event-passing simulator.
//!
//! Runs one [`eventpass_pool::Pool`] per rank on its own OS thread, wired
//! together by an in-process [`eventpass_spike::LocalCluster`], and merges
//! the per-rank statistics into a [`SimulationReport`].
//!
//! # Example
//!
//! ```no_run
//! use eventpass_pool::PoolConfig;
//! use eventpass_simulator::{Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(4, PoolConfig::new(8, 100));
//! let report = Simulator::new(config)?.run()?;
//! println!("{report}");
//! # Ok::<(), eventpass_simulator::SimulatorError>(())
//! ```

pub mod config;
mod error;
pub mod metrics;
pub mod runner;

pub use config::SimulatorConfig;
pub use error::SimulatorError;
pub use metrics::{LatencySummary, RankReport, SimulationReport};
pub use runner::Simulator;
