//! Explicit per-rank runtime context.

use eventpass_spike::{Communicator, TransportResult};
use eventpass_types::Rank;

/// The one place a rank learns who it is and how many peers it has.
///
/// Constructed once per rank at startup and handed to every component that
/// communicates.
#[derive(Debug)]
pub struct RuntimeContext<C> {
    comm: C,
}

impl<C: Communicator> RuntimeContext<C> {
    pub fn new(comm: C) -> Self {
        Self { comm }
    }

    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    pub fn size(&self) -> u32 {
        self.comm.size()
    }

    pub fn is_root(&self) -> bool {
        self.rank().is_root()
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn comm_mut(&mut self) -> &mut C {
        &mut self.comm
    }

    /// Synchronise every rank of the run.
    pub fn barrier(&mut self) -> TransportResult<()> {
        self.comm.barrier()
    }

    pub fn into_inner(self) -> C {
        self.comm
    }
}
