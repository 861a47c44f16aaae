//! Multi-rank runner.
//!
//! Every rank runs on its own OS thread with its own [`Pool`]; ranks only
//! meet through the [`LocalCluster`] collectives.

use crate::config::SimulatorConfig;
use crate::error::SimulatorError;
use crate::metrics::{RankReport, SimulationReport};
use eventpass_pool::{Pool, PoolConfig, PoolError, RuntimeContext};
use eventpass_spike::{Communicator, LocalCluster, LocalCommunicator, TransportError};
use std::thread;
use std::time::Instant;
use tracing::{error, info};

pub struct Simulator {
    config: SimulatorConfig,
}

impl Simulator {
    /// Create a simulator, rejecting configurations no rank could run.
    pub fn new(config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Run every rank to completion and collect their reports.
    pub fn run(&self) -> Result<SimulationReport, SimulatorError> {
        let started = Instant::now();
        info!(
            ranks = self.config.ranks,
            cell_groups = self.config.pool.cell_groups,
            simtime = self.config.pool.simtime,
            min_delay = self.config.pool.min_delay,
            protocol = %self.config.pool.protocol,
            mode = %self.config.pool.mode,
            "Starting simulation"
        );

        let comms = LocalCluster::new(self.config.ranks, self.config.timeout);
        let outcomes = thread::scope(|scope| -> Result<Vec<_>, SimulatorError> {
            let mut handles = Vec::with_capacity(comms.len());
            for comm in comms {
                let rank = comm.rank().0;
                let pool_config = self.config.pool.clone();
                let handle = thread::Builder::new()
                    .name(format!("rank-{rank}"))
                    .spawn_scoped(scope, move || run_rank(comm, pool_config))?;
                handles.push((rank, handle));
            }

            Ok(handles
                .into_iter()
                .map(|(rank, handle)| match handle.join() {
                    Ok(outcome) => outcome.map_err(|source| SimulatorError::Pool { rank, source }),
                    Err(_) => Err(SimulatorError::RankPanicked(rank)),
                })
                .collect())
        })?;

        let mut reports = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(error = %e, "Rank failed");
                    failures.push(e);
                }
            }
        }
        if let Some(failure) = root_cause(failures) {
            return Err(failure);
        }

        let report = SimulationReport::new(self.config.pool.clone(), reports, started.elapsed());
        info!(
            generated = report.totals.generated,
            delivered = report.totals.delivered,
            spikes_sent = report.totals.spikes_sent,
            elapsed_ms = report.elapsed_ms,
            "Simulation complete"
        );
        Ok(report)
    }
}

fn run_rank(comm: LocalCommunicator, config: PoolConfig) -> Result<RankReport, PoolError> {
    let rank = comm.rank().0;
    let mut pool = Pool::new(RuntimeContext::new(comm), config)?;
    let stats = pool.run()?;
    Ok(RankReport {
        rank,
        stats,
        exchange_latency: pool.exchange_latency().clone(),
    })
}

/// The failure that started a cascade. A rank that fails makes its peers see
/// it as gone, so those reports are only picked when nothing else failed.
fn root_cause(failures: Vec<SimulatorError>) -> Option<SimulatorError> {
    let is_peer_gone = |e: &SimulatorError| {
        matches!(
            e,
            SimulatorError::Pool {
                source: PoolError::Transport(TransportError::PeerGone { .. }),
                ..
            }
        )
    };
    match failures.iter().position(|e| !is_peer_gone(e)) {
        Some(index) => failures.into_iter().nth(index),
        None => failures.into_iter().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpass_types::Rank;

    #[test]
    fn test_root_cause_skips_peer_gone() {
        let gone = SimulatorError::Pool {
            rank: 1,
            source: PoolError::Transport(TransportError::PeerGone {
                rank: Rank(1),
                peer: Rank(0),
            }),
        };
        let failures = vec![gone, SimulatorError::RankPanicked(0)];
        assert!(matches!(
            root_cause(failures),
            Some(SimulatorError::RankPanicked(0))
        ));
        assert!(root_cause(Vec::new()).is_none());
    }

    #[test]
    fn test_invalid_config_rejected_up_front() {
        let config = SimulatorConfig::new(1, PoolConfig::new(2, 10).with_connectivity(4, 1, 1));
        let err = Simulator::new(config).err().unwrap();
        assert!(matches!(err, SimulatorError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
