//! Whole runs over an in-process cluster.

use eventpass_pool::{Pool, PoolConfig, PoolStats, RuntimeContext};
use eventpass_queueing::MailboxStrategy;
use eventpass_spike::{ExchangeMode, LocalCluster, ProtocolKind};
use std::thread;
use std::time::Duration;

const RANKS: u32 = 4;

fn base_config() -> PoolConfig {
    PoolConfig::new(3, 30)
        .with_min_delay(5)
        .with_events_per_step(4)
        .with_connectivity(4, 6, 2)
        .with_seed(2024)
}

/// Run `config` on every rank and return per-rank stats in rank order.
fn run_ranks(ranks: u32, config: &PoolConfig) -> Vec<PoolStats> {
    let comms = LocalCluster::new(ranks, Duration::from_secs(10));
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let config = config.clone();
                s.spawn(move || {
                    let mut pool = Pool::new(RuntimeContext::new(comm), config).unwrap();
                    pool.run().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn test_no_inter_thread_means_pure_self_events() {
    let config = base_config().with_percentages(0, 0);
    for stats in run_ranks(RANKS, &config) {
        assert!(stats.generated > 0);
        assert_eq!(stats.local, stats.generated);
        assert_eq!(stats.inter_thread, 0);
        assert_eq!(stats.inter_received, 0);
        assert_eq!(stats.spikes_sent, 0);
        assert_eq!(stats.spikes_received, 0);
    }
}

#[test]
fn test_all_inter_thread_never_targets_self() {
    let config = base_config().with_percentages(100, 0);
    for stats in run_ranks(RANKS, &config) {
        assert_eq!(stats.local, 0);
        assert_eq!(stats.inter_thread, stats.generated);
        // Every inter-thread send landed in another group's mailbox.
        assert_eq!(stats.inter_received, stats.generated);
    }
}

#[test]
fn test_all_spikes_counts_exactly() {
    let config = base_config().with_percentages(0, 100);
    let expected = config.total_steps() * config.cell_groups as u64 * 4;
    let per_rank = run_ranks(RANKS, &config);
    for stats in &per_rank {
        assert_eq!(stats.spikes_sent, expected);
        assert_eq!(stats.local + stats.inter_thread, 0);
    }

    // Global exchange: every rank sees every spike of the run.
    let total = PoolStats::accumulate(&per_rank);
    for stats in &per_rank {
        assert_eq!(stats.spikes_received, total.spikes_sent);
        assert_eq!(stats.spike_deliveries, stats.enqueued);
    }
    assert_eq!(total.windows, config.total_windows());
}

#[test]
fn test_global_and_neighbor_agree() {
    let global = run_ranks(RANKS, &base_config().with_protocol(ProtocolKind::Global));
    let neighbor = run_ranks(RANKS, &base_config().with_protocol(ProtocolKind::Neighbor));

    for (g, n) in global.iter().zip(&neighbor) {
        assert!(g.spikes_relevant > 0);
        assert_eq!(g.spikes_relevant, n.spikes_relevant);
        assert_eq!(g.spike_deliveries, n.spike_deliveries);
        assert_eq!(g.delivered, n.delivered);
        assert!(n.spikes_received <= g.spikes_received);
    }
}

#[test]
fn test_non_blocking_matches_blocking() {
    for protocol in [ProtocolKind::Global, ProtocolKind::Neighbor] {
        let config = base_config().with_protocol(protocol).with_update_phase(true);
        let blocking = run_ranks(RANKS, &config.clone().with_mode(ExchangeMode::Blocking));
        let non_blocking = run_ranks(RANKS, &config.with_mode(ExchangeMode::NonBlocking));
        assert_eq!(blocking, non_blocking, "{protocol}");
    }
}

#[test]
fn test_mailbox_strategies_agree() {
    let locked = run_ranks(RANKS, &base_config().with_mailbox(MailboxStrategy::Locked));
    let lock_free = run_ranks(RANKS, &base_config().with_mailbox(MailboxStrategy::LockFree));
    assert_eq!(locked, lock_free);
}

#[test]
fn test_runs_are_reproducible() {
    let config = base_config();
    assert_eq!(run_ranks(RANKS, &config), run_ranks(RANKS, &config));
}

#[test]
fn test_two_ranks_full_fan_in() {
    // Each rank listens to every output of the other.
    let config = base_config()
        .with_connectivity(3, 3, 3)
        .with_percentages(0, 100);
    let per_rank = run_ranks(2, &config);
    for stats in &per_rank {
        assert!(stats.spikes_relevant > 0);
        assert_eq!(stats.spike_deliveries, stats.spikes_relevant * 3);
    }
}
