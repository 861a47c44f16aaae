//! Cross-rank spike exchange.
//!
//! Spikes generated on one rank must reach every rank that listens to the
//! spiking gid. This crate provides:
//!
//! - [`Communicator`]: the collective-operation seam every exchange goes
//!   through. Rank and size come only from here.
//! - [`LocalCluster`]: an in-process implementation where each rank is a
//!   thread and ranks are joined by a mesh of channels.
//! - [`CommunicationGraph`]: discovery of which ranks actually need to talk.
//! - [`SpikeExchange`]: the two-phase (sizes, then data) exchange, either
//!   with every rank or only with graph neighbors, blocking or split into
//!   begin / progress / finish.

mod exchange;
mod graph;
mod local;
mod transport;

pub use exchange::{
    compute_displacements, ExchangeHandle, ExchangeMode, ExchangeProtocol, ExchangeStats,
    ProtocolKind, ReceivedSpikes, SpikeBuffers, SpikeExchange,
};
pub use graph::CommunicationGraph;
pub use local::{LocalCluster, LocalCommunicator, LocalGather};
pub use transport::{CollectiveKind, Communicator, GatherRequest, Tag, TransportError};

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
