//! The per-rank pool of cell groups.
//!
//! A [`Pool`] owns one worker per cell group and advances them together in
//! fixed steps. Within a rank, workers only meet in each other's mailboxes.
//! Across ranks, they meet once per `min_delay` window in the spike exchange.
//!
//! ```text
//!  per step (parallel over cell groups)      per window (rank-wide)
//! ┌─────────────┐   ┌───────────────┐      ┌──────────┐   ┌────────┐
//! │  Generate   │──►│ LocalDeliver  │─ … ─►│ Exchange │──►│ Filter │
//! └─────────────┘   └───────────────┘      └──────────┘   └────────┘
//!   local ──► own queue
//!   inter-thread ──► peer mailbox (+min_delay)
//!   spike ──► rank spike buffer (+min_delay)
//! ```

mod config;
mod error;
mod pool;
mod runtime;
mod stats;
mod update;

pub use config::{ConfigError, PoolConfig};
pub use error::PoolError;
pub use pool::{Pool, PoolPhase};
pub use runtime::RuntimeContext;
pub use stats::PoolStats;
