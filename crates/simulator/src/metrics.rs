//! Run report.

use eventpass_pool::{PoolConfig, PoolStats};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Outcome of one rank.
#[derive(Debug, Clone)]
pub struct RankReport {
    pub rank: u32,
    pub stats: PoolStats,
    /// Exchange wall-clock times in microseconds.
    pub exchange_latency: Histogram<u64>,
}

/// Exchange latency percentiles, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
    pub mean: f64,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }
        Self {
            samples: histogram.len(),
            p50: histogram.value_at_quantile(0.50),
            p90: histogram.value_at_quantile(0.90),
            p99: histogram.value_at_quantile(0.99),
            max: histogram.max(),
            mean: histogram.mean(),
        }
    }
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub ranks: u32,
    pub elapsed_ms: u64,
    pub config: PoolConfig,
    /// Totals over every rank.
    pub totals: PoolStats,
    pub per_rank: Vec<PoolStats>,
    /// Exchange latency over every window of every rank.
    pub exchange_latency_us: LatencySummary,
}

impl SimulationReport {
    pub fn new(config: PoolConfig, ranks: Vec<RankReport>, elapsed: Duration) -> Self {
        let mut latency: Option<Histogram<u64>> = None;
        for report in &ranks {
            match latency.as_mut() {
                None => latency = Some(report.exchange_latency.clone()),
                Some(merged) => {
                    if let Err(e) = merged.add(&report.exchange_latency) {
                        warn!(rank = report.rank, error = ?e, "Dropped exchange latency samples");
                    }
                }
            }
        }

        let per_rank: Vec<PoolStats> = ranks.iter().map(|r| r.stats).collect();
        Self {
            ranks: ranks.len() as u32,
            elapsed_ms: elapsed.as_millis() as u64,
            config,
            totals: PoolStats::accumulate(&per_rank),
            per_rank,
            exchange_latency_us: latency
                .as_ref()
                .map(LatencySummary::from_histogram)
                .unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Event-passing run ===")?;
        writeln!(
            f,
            "Ranks: {}  cell groups/rank: {}  simtime: {}  min_delay: {}",
            self.ranks, self.config.cell_groups, self.config.simtime, self.config.min_delay
        )?;
        writeln!(
            f,
            "Protocol: {}  mode: {}  mailbox: {}  generator: {}",
            self.config.protocol, self.config.mode, self.config.mailbox, self.config.generator
        )?;
        writeln!(f, "Run time: {} ms", self.elapsed_ms)?;
        writeln!(f)?;
        writeln!(f, "{}", self.totals)?;
        writeln!(f)?;
        let l = &self.exchange_latency_us;
        write!(
            f,
            "Exchange latency (us): p50 {}  p90 {}  p99 {}  max {}  ({} samples)",
            l.p50, l.p90, l.p99, l.max, l.samples
        )
    }
}
