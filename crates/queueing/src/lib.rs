//! Per-thread event queueing.
//!
//! Every cell group owns a [`ThreadContext`], which pairs a time-ordered
//! [`EventQueue`] with an [`Inbox`] that other cell groups deposit into.
//!
//! ```text
//!  cell group A                         cell group B
//! ┌──────────────────────┐             ┌──────────────────────┐
//! │ self_send ──► queue  │             │ queue ◄── enqueue_   │
//! │                      │  inter_send │            pending   │
//! │ inter_send ──────────┼────────────►│ inbox ──────┘        │
//! └──────────────────────┘             └──────────────────────┘
//! ```
//!
//! The queue is mutated only by its owning thread. The inbox is the sole
//! synchronization point between threads of one rank.

mod mailbox;
mod queue;
mod thread;

pub use mailbox::{Inbox, LockFreeMailbox, LockedMailbox, Mailbox, MailboxStrategy};
pub use queue::EventQueue;
pub use thread::{ThreadContext, ThreadCounters};
