//! Discovery of the ranks each rank must exchange spikes with.
//!
//! Discovery runs two rounds of broadcasts, each rank taking a turn as root:
//!
//! 1. The root broadcasts its output gids. Every rank that listens to one of
//!    them records the root as an in-neighbor.
//! 2. The root broadcasts its in-neighbor list. Every rank named in it
//!    records the root as an out-neighbor.
//!
//! Afterwards `r ∈ in(q)` exactly when `q ∈ out(r)`.

use crate::{Communicator, TransportResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use eventpass_environment::Connectivity;
use eventpass_types::{Gid, Rank, WireError};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// A rank's neighbors in the spike-communication graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationGraph {
    rank: Rank,
    /// Ranks whose spikes this rank needs.
    in_neighbors: BTreeSet<Rank>,
    /// Ranks that need this rank's spikes.
    out_neighbors: BTreeSet<Rank>,
}

impl CommunicationGraph {
    /// Build the graph collectively. Every rank must call this together.
    pub fn discover<C: Communicator>(
        comm: &mut C,
        connectivity: &Connectivity,
    ) -> TransportResult<Self> {
        let me = comm.rank();
        let size = comm.size();

        let mut in_neighbors = BTreeSet::new();
        for root in (0..size).map(Rank) {
            let mine = (root == me)
                .then(|| encode_u32s(connectivity.output_ids().iter().map(|gid| gid.0)));
            let payload = comm.broadcast(root, mine)?;
            if root == me {
                continue;
            }
            let listens = decode_u32s(&payload)?
                .into_iter()
                .any(|gid| connectivity.find_input(Gid(gid)).is_some());
            if listens {
                in_neighbors.insert(root);
            }
        }

        let mut out_neighbors = BTreeSet::new();
        for root in (0..size).map(Rank) {
            let mine = (root == me).then(|| encode_u32s(in_neighbors.iter().map(|r| r.0)));
            let payload = comm.broadcast(root, mine)?;
            if root == me {
                continue;
            }
            if decode_u32s(&payload)?.contains(&me.0) {
                out_neighbors.insert(root);
            }
        }

        info!(
            rank = me.0,
            in_degree = in_neighbors.len(),
            out_degree = out_neighbors.len(),
            "Discovered communication graph"
        );
        debug!(rank = me.0, ?in_neighbors, ?out_neighbors, "Neighbors");

        Ok(Self {
            rank: me,
            in_neighbors,
            out_neighbors,
        })
    }

    /// Graph with explicit neighbor sets.
    pub fn from_parts(
        rank: Rank,
        in_neighbors: BTreeSet<Rank>,
        out_neighbors: BTreeSet<Rank>,
    ) -> Self {
        Self {
            rank,
            in_neighbors,
            out_neighbors,
        }
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn in_neighbors(&self) -> &BTreeSet<Rank> {
        &self.in_neighbors
    }

    pub fn out_neighbors(&self) -> &BTreeSet<Rank> {
        &self.out_neighbors
    }

    /// Whether the graphs of all ranks of a run agree with each other.
    ///
    /// `graphs` must hold one graph per rank, in rank order.
    pub fn is_symmetric(graphs: &[CommunicationGraph]) -> bool {
        let lookup = |rank: Rank| graphs.get(rank.index());
        graphs.iter().all(|g| {
            g.in_neighbors
                .iter()
                .all(|r| lookup(*r).is_some_and(|peer| peer.out_neighbors.contains(&g.rank)))
                && g.out_neighbors
                    .iter()
                    .all(|r| lookup(*r).is_some_and(|peer| peer.in_neighbors.contains(&g.rank)))
        })
    }
}

fn encode_u32s(values: impl Iterator<Item = u32>) -> Bytes {
    let mut buf = BytesMut::new();
    for value in values {
        buf.put_u32_le(value);
    }
    buf.freeze()
}

fn decode_u32s(mut data: &[u8]) -> Result<Vec<u32>, WireError> {
    if data.len() % 4 != 0 {
        return Err(WireError::Truncated {
            len: data.len(),
            record: 4,
        });
    }
    let mut values = Vec::with_capacity(data.len() / 4);
    while data.has_remaining() {
        values.push(data.get_u32_le());
    }
    Ok(values)
}
