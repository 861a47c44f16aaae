//! Time-ordered event queue with a cached least element.

use eventpass_types::Event;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Ordering key for heap entries.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for equal times)
#[derive(Debug, Clone, Copy)]
struct QueueKey {
    time: f64,
    sequence: u64,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.total_cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

/// Payload of a heap entry. Invalidated entries stay in the heap as
/// tombstones and are discarded when they reach the top.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Live(Event),
    Tombstone,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: QueueKey,
    slot: Slot,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Per-thread priority queue.
///
/// The least element is always held outside the heap in `least`, so checking
/// whether anything is due is a single comparison. The heap is never required
/// to be sorted beyond its top.
#[derive(Debug, Default)]
pub struct EventQueue {
    least: Option<(QueueKey, Event)>,
    heap: BinaryHeap<Reverse<Entry>>,
    /// Live events (cached least plus non-tombstoned heap entries).
    live: usize,
    next_sequence: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event.
    ///
    /// The first insert into an empty queue installs the cache. Afterwards a
    /// strictly earlier event demotes the cached one into the heap and takes
    /// its place; anything else goes straight into the heap.
    pub fn insert(&mut self, event: Event) {
        let key = QueueKey {
            time: event.time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.live += 1;

        match self.least.take() {
            None => self.least = Some((key, event)),
            Some((least_key, least)) if key < least_key => {
                self.push_heap(least_key, least);
                self.least = Some((key, event));
            }
            Some(current) => {
                self.least = Some(current);
                self.push_heap(key, event);
            }
        }
    }

    /// Time of the least event, if any.
    pub fn peek_time(&self) -> Option<f64> {
        self.least.as_ref().map(|(key, _)| key.time)
    }

    /// Remove and return the least event if its time is `<= til`.
    ///
    /// Returns `None` without touching the queue otherwise.
    pub fn pop_due(&mut self, til: f64) -> Option<Event> {
        match self.least {
            Some((key, _)) if key.time <= til => {}
            _ => return None,
        }

        let (_, event) = self.least.take()?;
        self.live -= 1;
        self.refill();
        Some(event)
    }

    /// Tombstone every queued event matching `predicate`.
    ///
    /// Returns how many events were invalidated. Tombstones are skipped when
    /// they surface at the top of the heap.
    pub fn invalidate<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Event) -> bool,
    {
        let mut removed = 0;

        let mut entries = std::mem::take(&mut self.heap).into_vec();
        for Reverse(entry) in entries.iter_mut() {
            if let Slot::Live(event) = entry.slot {
                if predicate(&event) {
                    entry.slot = Slot::Tombstone;
                    removed += 1;
                }
            }
        }
        self.heap = BinaryHeap::from(entries);

        if let Some((_, event)) = &self.least {
            if predicate(event) {
                self.least = None;
                removed += 1;
            }
        }

        self.live -= removed;
        if self.least.is_none() {
            self.refill();
        }
        removed
    }

    /// Number of live events.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn push_heap(&mut self, key: QueueKey, event: Event) {
        self.heap.push(Reverse(Entry {
            key,
            slot: Slot::Live(event),
        }));
    }

    /// Promote the next live heap entry into the cache, discarding tombstones.
    fn refill(&mut self) {
        debug_assert!(self.least.is_none(), "refill with an occupied cache");
        while let Some(Reverse(entry)) = self.heap.pop() {
            if let Slot::Live(event) = entry.slot {
                self.least = Some((entry.key, event));
                return;
            }
        }
        debug_assert_eq!(self.live, 0, "live events lost from the heap");
    }
}
