//! Core types for the event-passing engine.
//!
//! This crate provides the foundational types shared by every other crate in
//! the workspace:
//!
//! - **Identifiers**: `Gid`, `CellGroupId`, `Rank`
//! - **Events**: `Event` (local queue entry), `GeneratedEvent` and `EventKind`
//! - **Wire**: `SpikeItem` and its fixed-layout codec for cross-rank exchange
//!
//! # Design Philosophy
//!
//! This crate does not depend on any other workspace crate, making it the
//! foundation layer.

mod event;
mod identifiers;
mod wire;

pub use event::{Event, EventKind, GeneratedEvent};
pub use identifiers::{CellGroupId, Gid, Rank};
pub use wire::{decode_spikes, encode_spikes, SpikeItem, WireError};
