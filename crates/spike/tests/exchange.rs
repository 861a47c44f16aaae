//! Multi-rank exchange over an in-process cluster.

use eventpass_environment::{Connectivity, ConnectivityBuilder};
use eventpass_spike::{
    CommunicationGraph, Communicator, ExchangeProtocol, LocalCluster, LocalCommunicator,
    ReceivedSpikes, SpikeExchange,
};
use eventpass_types::{Rank, SpikeItem};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::thread;
use std::time::Duration;

const RANKS: u32 = 4;
const CELL_GROUPS: u32 = 3;

fn builder() -> ConnectivityBuilder {
    ConnectivityBuilder::new(6, 5, 2).with_seed(42)
}

/// Spikes from a random subset of this rank's outputs.
fn outgoing(conn: &Connectivity, round: u64) -> Vec<SpikeItem> {
    let mut rng = ChaCha8Rng::seed_from_u64(round * 100 + conn.rank().0 as u64);
    conn.output_ids()
        .iter()
        .filter(|_| rng.gen_bool(0.6))
        .map(|gid| SpikeItem::new(*gid, round as f64))
        .collect()
}

fn relevant(conn: &Connectivity, received: &ReceivedSpikes) -> Vec<SpikeItem> {
    let mut items: Vec<SpikeItem> = received
        .spikes
        .iter()
        .filter(|s| conn.find_input(s.dst).is_some())
        .copied()
        .collect();
    items.sort_by(|a, b| a.dst.cmp(&b.dst).then(a.time.total_cmp(&b.time)));
    items
}

#[derive(Debug)]
struct RankOutcome {
    global: Vec<Vec<SpikeItem>>,
    neighbor: Vec<Vec<SpikeItem>>,
    non_blocking: Vec<Vec<SpikeItem>>,
    neighbor_received: u64,
    global_received: u64,
}

fn run_rank(mut comm: LocalCommunicator) -> RankOutcome {
    let conn = builder().build(RANKS, CELL_GROUPS, comm.rank()).unwrap();
    let graph = CommunicationGraph::discover(&mut comm, &conn).unwrap();

    let mut global = SpikeExchange::new(ExchangeProtocol::Global);
    let mut neighbor = SpikeExchange::new(ExchangeProtocol::Neighbor(graph.clone()));
    let mut overlapped = SpikeExchange::new(ExchangeProtocol::Neighbor(graph));

    let mut outcome = RankOutcome {
        global: Vec::new(),
        neighbor: Vec::new(),
        non_blocking: Vec::new(),
        neighbor_received: 0,
        global_received: 0,
    };

    for round in 0..5 {
        let out = outgoing(&conn, round);

        let received = global.exchange(&mut comm, &out).unwrap();
        assert_eq!(received.sources.len(), RANKS as usize);
        outcome.global.push(relevant(&conn, &received));

        let received = neighbor.exchange(&mut comm, &out).unwrap();
        outcome.neighbor.push(relevant(&conn, &received));

        let mut handle = overlapped.begin(&mut comm, &out).unwrap();
        let mut polls = 0;
        while !handle.progress(&mut comm).unwrap() && polls < 1_000 {
            polls += 1;
            thread::yield_now();
        }
        let received = overlapped.finish(&mut comm, handle).unwrap();
        outcome.non_blocking.push(relevant(&conn, &received));
    }

    comm.barrier().unwrap();
    outcome.global_received = global.stats().spikes_in;
    outcome.neighbor_received = neighbor.stats().spikes_in;
    assert_eq!(overlapped.stats(), neighbor.stats());
    outcome
}

fn run_cluster() -> Vec<RankOutcome> {
    let comms = LocalCluster::new(RANKS, Duration::from_secs(10));
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || run_rank(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn test_global_and_neighbor_deliver_the_same_relevant_spikes() {
    for outcome in run_cluster() {
        assert_eq!(outcome.global, outcome.neighbor);
        assert!(outcome.neighbor_received <= outcome.global_received);
    }
}

#[test]
fn test_non_blocking_matches_blocking() {
    for outcome in run_cluster() {
        assert_eq!(outcome.non_blocking, outcome.neighbor);
    }
}

#[test]
fn test_global_exchange_sees_every_spike() {
    // Every rank receives every rank's spikes, own included.
    let outcomes = run_cluster();
    let expected: u64 = (0..RANKS)
        .map(|r| {
            let conn = builder().build(RANKS, CELL_GROUPS, Rank(r)).unwrap();
            (0..5).map(|round| outgoing(&conn, round).len() as u64).sum::<u64>()
        })
        .sum();
    for outcome in outcomes {
        assert_eq!(outcome.global_received, expected);
    }
}
