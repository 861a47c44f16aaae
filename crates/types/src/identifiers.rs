//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Presynaptic endpoint identifier.
///
/// Gids are the addresses spikes travel to between ranks. Each rank owns a
/// contiguous range of output gids; input gids are gids owned by other ranks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Gid(pub u32);

impl Gid {
    /// Rank owning this gid when every rank owns `num_out` contiguous gids.
    pub fn owner(self, num_out: u32) -> Rank {
        Rank(self.0 / num_out.max(1))
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gid({})", self.0)
    }
}

/// Cell group identifier.
///
/// A cell group is the unit of per-thread parallelism within a rank; it owns
/// exactly one event queue and one mailbox.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellGroupId(pub u32);

impl CellGroupId {
    /// Index into per-group arenas.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CellGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellGroup({})", self.0)
    }
}

/// Process rank within a distributed run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Rank(pub u32);

impl Rank {
    /// The rank that reports run-wide summaries.
    pub const ROOT: Self = Rank(0);

    /// Index into per-rank arrays.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rank({})", self.0)
    }
}
