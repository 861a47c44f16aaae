//! Inter-thread mailboxes.
//!
//! A mailbox is where other cell groups of the same rank deposit events for
//! its owner. Any number of producers may deposit concurrently; only the
//! owning thread drains. Two interchangeable strategies are provided:
//!
//! - [`LockedMailbox`]: a mutex-protected growable buffer
//! - [`LockFreeMailbox`]: an intrusive singly-linked list pushed with CAS and
//!   consumed by an atomic pop-all
//!
//! Both deliver exactly the deposited events, never losing or duplicating
//! one. Arrival order relative to the owner's own self-sends is unspecified.

use eventpass_types::Event;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};

/// Concurrent inbox for a single consuming thread.
pub trait Mailbox: Send + Sync {
    /// Deposit an event. Callable from any thread.
    fn deposit(&self, event: Event);

    /// Take every deposited event. Must only be called by the owning thread.
    fn drain(&self) -> Vec<Event>;

    /// Events deposited but not yet drained.
    fn pending(&self) -> usize;

    /// Total events ever deposited.
    fn received(&self) -> u64;
}

/// Mutex-protected buffer swapped out on drain.
#[derive(Debug, Default)]
pub struct LockedMailbox {
    buffer: Mutex<Vec<Event>>,
    received: AtomicU64,
}

impl LockedMailbox {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mailbox for LockedMailbox {
    fn deposit(&self, event: Event) {
        self.buffer.lock().push(event);
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.buffer.lock())
    }

    fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

struct Node {
    event: Event,
    next: *mut Node,
}

/// Multi-producer, single-consumer intrusive list.
///
/// Producers push heap-allocated nodes onto `head` with a compare-and-swap.
/// The consumer detaches the whole chain by swapping `head` to null, so a
/// node is never reachable by a producer once the consumer sees it.
pub struct LockFreeMailbox {
    head: AtomicPtr<Node>,
    pending: AtomicUsize,
    received: AtomicU64,
}

impl LockFreeMailbox {
    pub fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            pending: AtomicUsize::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Free a detached chain, returning its events newest first.
    fn take_chain(mut current: *mut Node) -> Vec<Event> {
        let mut events = Vec::new();
        while !current.is_null() {
            // SAFETY: every node was created by `Box::into_raw` in `deposit`
            // and the chain was detached from `head` by a swap, so this is
            // the only remaining reference to it.
            let node = unsafe { Box::from_raw(current) };
            events.push(node.event);
            current = node.next;
        }
        events
    }
}

impl Default for LockFreeMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockFreeMailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeMailbox")
            .field("pending", &self.pending())
            .field("received", &self.received())
            .finish()
    }
}

impl Mailbox for LockFreeMailbox {
    fn deposit(&self, event: Event) {
        let node = Box::into_raw(Box::new(Node {
            event,
            next: ptr::null_mut(),
        }));

        // Counted before publishing so a concurrent drain never subtracts
        // more than has been added.
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.received.fetch_add(1, Ordering::Relaxed);

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `node` is not yet published, we hold the only pointer.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }
    }

    fn drain(&self) -> Vec<Event> {
        let chain = self.head.swap(ptr::null_mut(), Ordering::Acquire);
        let mut events = Self::take_chain(chain);
        self.pending.fetch_sub(events.len(), Ordering::Relaxed);
        // The list is LIFO; hand events back in arrival order.
        events.reverse();
        events
    }

    fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl Drop for LockFreeMailbox {
    fn drop(&mut self) {
        let chain = std::mem::replace(self.head.get_mut(), ptr::null_mut());
        Self::take_chain(chain);
    }
}

/// Mailbox strategy selected at configuration time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MailboxStrategy {
    /// Mutex-protected buffer.
    #[default]
    Locked,
    /// CAS-pushed intrusive list.
    LockFree,
}

impl fmt::Display for MailboxStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxStrategy::Locked => write!(f, "locked"),
            MailboxStrategy::LockFree => write!(f, "lock-free"),
        }
    }
}

/// A cell group's inbox, dispatching to the configured strategy.
#[derive(Debug)]
pub enum Inbox {
    Locked(LockedMailbox),
    LockFree(LockFreeMailbox),
}

impl Inbox {
    pub fn new(strategy: MailboxStrategy) -> Self {
        match strategy {
            MailboxStrategy::Locked => Inbox::Locked(LockedMailbox::new()),
            MailboxStrategy::LockFree => Inbox::LockFree(LockFreeMailbox::new()),
        }
    }

    pub fn strategy(&self) -> MailboxStrategy {
        match self {
            Inbox::Locked(_) => MailboxStrategy::Locked,
            Inbox::LockFree(_) => MailboxStrategy::LockFree,
        }
    }
}

impl Mailbox for Inbox {
    fn deposit(&self, event: Event) {
        match self {
            Inbox::Locked(m) => m.deposit(event),
            Inbox::LockFree(m) => m.deposit(event),
        }
    }

    fn drain(&self) -> Vec<Event> {
        match self {
            Inbox::Locked(m) => m.drain(),
            Inbox::LockFree(m) => m.drain(),
        }
    }

    fn pending(&self) -> usize {
        match self {
            Inbox::Locked(m) => m.pending(),
            Inbox::LockFree(m) => m.pending(),
        }
    }

    fn received(&self) -> u64 {
        match self {
            Inbox::Locked(m) => m.received(),
            Inbox::LockFree(m) => m.received(),
        }
    }
}
