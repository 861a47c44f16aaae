//! The collective-communication seam.

use crate::TransportResult;
use bytes::Bytes;
use eventpass_types::{Rank, WireError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Collective operation a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectiveKind {
    Broadcast,
    AllGather,
    NeighborGather,
    Barrier,
}

/// Identifies one collective call. Every rank issues collectives in the same
/// order, so matching ranks agree on the sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: CollectiveKind,
    pub seq: u64,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.seq)
    }
}

/// Transport failures. None of these are recoverable: a rank that sees one
/// can no longer assume its peers agree on the state of the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{rank} expected {expected} from {from} but received {got}")]
    Desync {
        rank: Rank,
        from: Rank,
        expected: Tag,
        got: Tag,
    },

    #[error("{rank} timed out after {timeout:?} waiting on {from} for {tag}")]
    Timeout {
        rank: Rank,
        from: Rank,
        tag: Tag,
        timeout: Duration,
    },

    #[error("{rank} lost its connection to {peer}")]
    PeerGone { rank: Rank, peer: Rank },

    #[error("{from} announced {announced} spikes but sent a {bytes}-byte payload")]
    CountMismatch {
        from: Rank,
        announced: usize,
        bytes: usize,
    },

    #[error("Exchange abandoned after an earlier transport failure")]
    Abandoned,

    #[error("{0} is not a rank of this run")]
    UnknownRank(Rank),

    #[error("Malformed payload: {0}")]
    Wire(#[from] WireError),
}

/// An outstanding non-blocking collective.
pub trait GatherRequest: Send {
    /// Poll for completion without blocking.
    fn test(&mut self) -> TransportResult<bool>;

    /// Block until complete, returning one payload per source in source order.
    fn wait(self) -> TransportResult<Vec<Bytes>>;
}

/// Collective operations between the ranks of a run.
///
/// All ranks must issue the same collectives in the same order. A
/// non-blocking collective must be waited on before the next collective is
/// issued.
pub trait Communicator: Send {
    type Request: GatherRequest;

    fn rank(&self) -> Rank;

    fn size(&self) -> u32;

    /// Distribute `payload` from `root` to every rank. Only the root passes
    /// `Some`; everyone returns the root's payload.
    fn broadcast(&mut self, root: Rank, payload: Option<Bytes>) -> TransportResult<Bytes>;

    /// Gather one payload from every rank, in rank order, own included.
    fn all_gather(&mut self, payload: Bytes) -> TransportResult<Vec<Bytes>> {
        self.post_all_gather(payload)?.wait()
    }

    /// Send `payload` to every rank in `targets` and gather one payload from
    /// every rank in `sources`, in the order given.
    fn neighbor_all_gather(
        &mut self,
        targets: &[Rank],
        sources: &[Rank],
        payload: Bytes,
    ) -> TransportResult<Vec<Bytes>> {
        self.post_neighbor_all_gather(targets, sources, payload)?
            .wait()
    }

    fn post_all_gather(&mut self, payload: Bytes) -> TransportResult<Self::Request>;

    fn post_neighbor_all_gather(
        &mut self,
        targets: &[Rank],
        sources: &[Rank],
        payload: Bytes,
    ) -> TransportResult<Self::Request>;

    /// Block until every rank has reached the barrier.
    fn barrier(&mut self) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpass_types::decode_spikes;

    #[test]
    fn test_wire_errors_convert_and_clone() {
        let err: TransportError = decode_spikes(&[0u8; 5]).unwrap_err().into();
        let copy = err.clone();
        assert_eq!(
            copy,
            TransportError::Wire(WireError::Truncated { len: 5, record: 12 })
        );
        assert_eq!(err, copy);
    }
}
