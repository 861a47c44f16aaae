//! Queue events and generator output.

use crate::{CellGroupId, Gid, SpikeItem};
use serde::{Deserialize, Serialize};

/// A timed event held in a cell group's queue.
///
/// `target` is a cell group index for local and inter-thread events. Events
/// have no identity beyond their fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Destination cell group.
    pub target: u32,
    /// Delivery time in simulation steps.
    pub time: f64,
}

impl Event {
    pub fn new(target: u32, time: f64) -> Self {
        Self { target, time }
    }

    /// Copy of this event with its time pushed back by `delay`.
    pub fn delayed(self, delay: f64) -> Self {
        Self {
            target: self.target,
            time: self.time + delay,
        }
    }
}

impl From<SpikeItem> for Event {
    fn from(item: SpikeItem) -> Self {
        Self {
            target: item.dst.0,
            time: item.time,
        }
    }
}

/// Delivery path selected for a generated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Destination is the generating cell group itself.
    Local,
    /// Destination is another cell group on the same rank.
    InterThread,
    /// Destination is a presynaptic endpoint that must cross ranks.
    Spike,
}

/// An event as produced by an event generator, before routing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratedEvent {
    /// Cell group that generated the event.
    pub source: CellGroupId,
    /// Cell group index (local / inter-thread) or gid (spike).
    pub target: u32,
    /// Event time in simulation steps.
    pub time: f64,
    /// Delivery path.
    pub kind: EventKind,
}

impl GeneratedEvent {
    /// Queue entry for the local and inter-thread paths.
    pub fn to_event(&self) -> Event {
        Event::new(self.target, self.time)
    }

    /// Wire item for the spike path.
    pub fn to_spike(&self) -> SpikeItem {
        SpikeItem::new(Gid(self.target), self.time)
    }
}
