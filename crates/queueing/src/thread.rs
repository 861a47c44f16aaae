//! Per-cell-group thread context.

use crate::{EventQueue, Inbox, Mailbox};
use eventpass_types::{CellGroupId, Event};
use serde::Serialize;
use std::sync::Arc;
use tracing::trace;

/// Counters owned by a single thread context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThreadCounters {
    /// Events pushed into the queue (self-sends plus drained mailbox items).
    pub enqueued: u64,
    /// Events popped as due and processed.
    pub delivered: u64,
    /// Events this thread sent to itself.
    pub local_received: u64,
    /// Events other threads deposited into this thread's inbox.
    pub inter_received: u64,
}

/// State owned by one cell group: its queue and its view of the rank's inboxes.
///
/// All inboxes of a rank live in one shared arena; a context addresses its
/// own and its peers' inbox by cell group index.
#[derive(Debug)]
pub struct ThreadContext {
    id: CellGroupId,
    queue: EventQueue,
    inboxes: Arc<[Inbox]>,
    enqueued: u64,
    delivered: u64,
    local_received: u64,
}

impl ThreadContext {
    /// Create the context for cell group `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` has no inbox in `inboxes`.
    pub fn new(id: CellGroupId, inboxes: Arc<[Inbox]>) -> Self {
        assert!(
            id.index() < inboxes.len(),
            "cell group {id} has no inbox ({} allocated)",
            inboxes.len()
        );
        Self {
            id,
            queue: EventQueue::new(),
            inboxes,
            enqueued: 0,
            delivered: 0,
            local_received: 0,
        }
    }

    /// Build one context per inbox in the arena.
    pub fn for_arena(inboxes: &Arc<[Inbox]>) -> Vec<ThreadContext> {
        (0..inboxes.len() as u32)
            .map(|i| ThreadContext::new(CellGroupId(i), Arc::clone(inboxes)))
            .collect()
    }

    pub fn id(&self) -> CellGroupId {
        self.id
    }

    /// Push an event directly into this thread's queue.
    pub fn self_send(&mut self, target: u32, time: f64) {
        self.enqueued += 1;
        self.local_received += 1;
        self.queue.insert(Event::new(target, time));
    }

    /// Send an event to another cell group's inbox.
    ///
    /// Degrades to [`Self::self_send`] when `target` is this cell group.
    pub fn inter_send(&mut self, target: u32, time: f64) {
        if target == self.id.0 {
            self.self_send(target, time);
            return;
        }
        debug_assert!(
            (target as usize) < self.inboxes.len(),
            "inter-thread send to unknown cell group {target}"
        );
        self.inboxes[target as usize].deposit(Event::new(target, time));
    }

    /// Move everything deposited in this thread's inbox into its queue.
    ///
    /// Returns the number of events moved.
    pub fn enqueue_pending(&mut self) -> usize {
        let pending = self.inboxes[self.id.index()].drain();
        let moved = pending.len();
        for event in pending {
            self.enqueued += 1;
            self.queue.insert(event);
        }
        if moved > 0 {
            trace!(cell_group = self.id.0, moved, "Enqueued inbox events");
        }
        moved
    }

    /// Pop and process one event due at or before `now`.
    ///
    /// Returns whether an event was delivered; callers loop until `false`.
    pub fn deliver(&mut self, now: f64) -> bool {
        match self.queue.pop_due(now) {
            Some(event) => {
                debug_assert_eq!(
                    event.target, self.id.0,
                    "event delivered to the wrong cell group"
                );
                self.delivered += 1;
                true
            }
            None => false,
        }
    }

    /// Deliver every event due at or before `now`, returning how many.
    pub fn deliver_all(&mut self, now: f64) -> u64 {
        let mut count = 0;
        while self.deliver(now) {
            count += 1;
        }
        count
    }

    /// Events currently queued.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Events waiting in this thread's inbox.
    pub fn inbox_len(&self) -> usize {
        self.inboxes[self.id.index()].pending()
    }

    pub fn counters(&self) -> ThreadCounters {
        ThreadCounters {
            enqueued: self.enqueued,
            delivered: self.delivered,
            local_received: self.local_received,
            inter_received: self.inboxes[self.id.index()].received(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MailboxStrategy;

    fn arena(n: usize, strategy: MailboxStrategy) -> Arc<[Inbox]> {
        (0..n).map(|_| Inbox::new(strategy)).collect()
    }

    #[test]
    fn test_self_send_counts() {
        let inboxes = arena(1, MailboxStrategy::Locked);
        let mut ctx = ThreadContext::new(CellGroupId(0), inboxes);
        for i in 0..25 {
            ctx.self_send(0, i as f64);
        }
        assert_eq!(ctx.queue_len(), 25);
        assert_eq!(ctx.counters().enqueued, 25);
        assert_eq!(ctx.counters().local_received, 25);
    }

    #[test]
    fn test_mailbox_round_trip() {
        for strategy in [MailboxStrategy::Locked, MailboxStrategy::LockFree] {
            let inboxes = arena(2, strategy);
            let mut contexts = ThreadContext::for_arena(&inboxes);
            let (left, right) = contexts.split_at_mut(1);
            let (sender, receiver) = (&mut left[0], &mut right[0]);

            for i in 0..40 {
                sender.inter_send(1, i as f64);
            }
            assert_eq!(receiver.inbox_len(), 40);
            assert_eq!(receiver.queue_len(), 0);

            assert_eq!(receiver.enqueue_pending(), 40);
            assert_eq!(receiver.queue_len(), 40);
            assert_eq!(receiver.inbox_len(), 0);
            assert_eq!(receiver.counters().inter_received, 40);
            assert_eq!(receiver.counters().enqueued, 40);

            // Nothing pending: drain is a no-op.
            assert_eq!(receiver.enqueue_pending(), 0);
            assert_eq!(receiver.queue_len(), 40);
            assert_eq!(sender.queue_len(), 0);
        }
    }

    #[test]
    fn test_inter_send_to_self_degrades_to_self_send() {
        let inboxes = arena(2, MailboxStrategy::LockFree);
        let mut ctx = ThreadContext::new(CellGroupId(1), inboxes);
        ctx.inter_send(1, 3.0);
        assert_eq!(ctx.queue_len(), 1);
        assert_eq!(ctx.inbox_len(), 0);
        assert_eq!(ctx.counters().inter_received, 0);
    }

    #[test]
    fn test_delivery_boundary() {
        let inboxes = arena(2, MailboxStrategy::Locked);
        let mut contexts = ThreadContext::for_arena(&inboxes);
        let (left, right) = contexts.split_at_mut(1);
        let (peer, ctx) = (&mut left[0], &mut right[0]);

        // Mix of self-sends and mailbox deposits.
        ctx.self_send(1, 1.0);
        peer.inter_send(1, 2.0);
        ctx.self_send(1, 3.0);
        peer.inter_send(1, 4.0);
        peer.inter_send(1, 5.0);
        ctx.self_send(1, 6.0);
        ctx.enqueue_pending();
        assert_eq!(ctx.queue_len(), 6);

        assert_eq!(ctx.deliver_all(1.0), 1);
        assert_eq!(ctx.queue_len(), 5);

        assert_eq!(ctx.deliver_all(3.0), 2);
        assert_eq!(ctx.queue_len(), 3);

        assert_eq!(ctx.deliver_all(6.0), 3);
        assert_eq!(ctx.queue_len(), 0);
        assert_eq!(ctx.counters().delivered, 6);
        assert!(!ctx.deliver(100.0));
    }

    #[test]
    #[should_panic(expected = "has no inbox")]
    fn test_context_without_inbox_panics() {
        let inboxes = arena(1, MailboxStrategy::Locked);
        let _ = ThreadContext::new(CellGroupId(3), inboxes);
    }
}
