//! Per-conference waitlist channel abstraction.
//!
//! One logical FIFO-with-priority queue exists per conference, created on
//! demand the first time a booking cannot be seated. The channel is the sole
//! authority on waitlist *order*; booking state lives in the booking store,
//! and the admission engine keeps the two consistent.
//!
//! # Delivery semantics
//!
//! **At-least-once with idempotent enqueue**: enqueue attempts are
//! deduplicated against a durable log keyed by the entry's
//! [`IdempotencyKey`](crate::types::IdempotencyKey), so a retried enqueue
//! after a partial failure cannot create a second message — and a *failed*
//! enqueue must leave no log marker behind, so a genuine retry is not
//! permanently blocked. Dequeue is a destructive pop; a caller whose
//! processing fails after the pop compensates by re-enqueuing the entry at
//! the `Requeued` tier rather than losing it.
//!
//! # Ordering
//!
//! Strict priority tiers: `Requeued` entries are served before `Normal`
//! entries, FIFO within each tier. Cross-queue operations have no ordering
//! guarantee relative to each other.
//!
//! # Implementations
//!
//! - `PgWaitlistChannel` (in `admission-postgres`): table-backed, production
//! - `InMemoryWaitlistChannel` (in `admission-testing`): deterministic testing
//!
//! # Dyn compatibility
//!
//! Trait methods return explicit `Pin<Box<dyn Future>>` instead of `async fn`
//! so the trait can be injected as `Arc<dyn WaitlistChannel>`.

use crate::types::{IdempotencyKey, QueueId, WaitlistEntry};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by channel trait methods.
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

/// Predicate selecting entries to discard during [`WaitlistChannel::remove_where`].
pub type RemovePredicate<'a> = &'a (dyn Fn(&WaitlistEntry) -> bool + Send + Sync);

/// Errors that can occur during waitlist channel operations.
#[derive(Error, Debug, Clone)]
pub enum ChannelError {
    /// Failed to reach the channel backend.
    #[error("channel connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to enqueue an entry. The idempotency marker for the attempt has
    /// been rolled back; the same enqueue may be retried.
    #[error("enqueue failed for queue '{queue}': {reason}")]
    EnqueueFailed {
        /// The queue that failed.
        queue: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to pop the head of a queue.
    #[error("dequeue failed for queue '{queue}': {reason}")]
    DequeueFailed {
        /// The queue that failed.
        queue: String,
        /// The reason for failure.
        reason: String,
    },

    /// Failed to drain or restore a queue.
    #[error("drain failed for queue '{queue}': {reason}")]
    DrainFailed {
        /// The queue that failed.
        queue: String,
        /// The reason for failure.
        reason: String,
    },

    /// A stored entry could not be mapped back to a [`WaitlistEntry`].
    #[error("corrupt waitlist entry: {0}")]
    CorruptEntry(String),
}

/// Result of an enqueue attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The entry was appended to its priority tier.
    Enqueued,
    /// An enqueue with the same idempotency key already happened; nothing was
    /// appended.
    Duplicate,
}

impl EnqueueOutcome {
    /// Whether the attempt was deduplicated.
    #[must_use]
    pub const fn is_duplicate(self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// Ordered, at-least-once waitlist queue per conference.
///
/// Queues come into existence implicitly on first enqueue; operations on a
/// queue that was never written behave as operations on an empty queue.
pub trait WaitlistChannel: Send + Sync {
    /// Idempotently append an entry to its priority tier.
    ///
    /// Duplicate attempts (same idempotency key) return
    /// [`EnqueueOutcome::Duplicate`] without appending. A failed attempt must
    /// roll back its idempotency marker before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::EnqueueFailed`] when the entry could not be
    /// appended; the attempt may be retried.
    fn enqueue<'a>(
        &'a self,
        queue: &'a QueueId,
        entry: WaitlistEntry,
    ) -> ChannelFuture<'a, EnqueueOutcome>;

    /// Pop the head of the queue honoring priority tiers; `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DequeueFailed`] on backend failure; the queue
    /// is left unchanged.
    fn dequeue_next<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, Option<WaitlistEntry>>;

    /// Return a previously dequeued entry to the queue, bypassing the
    /// idempotency log.
    ///
    /// This is the compensation half of the at-least-once contract: a caller
    /// whose processing fails after a pop puts the entry back (usually at the
    /// `Requeued` tier) instead of losing it. The log is bypassed because the
    /// entry's key was already recorded by its original enqueue.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::EnqueueFailed`] on backend failure.
    fn requeue<'a>(&'a self, queue: &'a QueueId, entry: WaitlistEntry) -> ChannelFuture<'a, ()>;

    /// Drain the queue, discard entries matching `predicate` (returned to the
    /// caller), and restore the rest preserving relative order and original
    /// priority.
    ///
    /// The restore bypasses the idempotency log — it is a reconstruction of
    /// the queue, not a new enqueue. Cost is O(queue depth); this is the one
    /// place ordering is rebuilt explicitly, since the channel offers no
    /// random-access delete.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DrainFailed`] on backend failure; either the
    /// whole removal applies or none of it does.
    fn remove_where<'a>(
        &'a self,
        queue: &'a QueueId,
        predicate: RemovePredicate<'a>,
    ) -> ChannelFuture<'a, Vec<WaitlistEntry>>;

    /// Whether a live entry with this idempotency key is currently queued.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DequeueFailed`] on backend failure.
    fn contains<'a>(
        &'a self,
        queue: &'a QueueId,
        key: &'a IdempotencyKey,
    ) -> ChannelFuture<'a, bool>;

    /// Discard every entry and the queue's idempotency log; returns how many
    /// entries were dropped. Used when a conference has started and its
    /// waitlist is void.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DrainFailed`] on backend failure.
    fn purge<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, usize>;

    /// Current number of queued entries.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DequeueFailed`] on backend failure.
    fn depth<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, usize>;
}
