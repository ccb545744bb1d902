//! In-memory waitlist channel with the production ordering and dedup
//! semantics, plus scriptable enqueue failures for exercising rollback paths.

use admission_core::channel::{
    ChannelError, ChannelFuture, EnqueueOutcome, RemovePredicate, WaitlistChannel,
};
use admission_core::types::{IdempotencyKey, QueueId, WaitlistEntry};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// One logical queue: two FIFO tiers plus the durable enqueue log.
#[derive(Debug, Default)]
struct QueueState {
    /// Entries re-inserted after the system took them out of place.
    requeued: VecDeque<WaitlistEntry>,
    /// First-time enqueues and expiry demotions.
    normal: VecDeque<WaitlistEntry>,
    /// Every idempotency key ever successfully enqueued.
    log: HashSet<IdempotencyKey>,
}

impl QueueState {
    fn depth(&self) -> usize {
        self.requeued.len() + self.normal.len()
    }

    fn push(&mut self, entry: WaitlistEntry) {
        match entry.priority {
            admission_core::types::Priority::Requeued => self.requeued.push_back(entry),
            admission_core::types::Priority::Normal => self.normal.push_back(entry),
        }
    }

    fn pop(&mut self) -> Option<WaitlistEntry> {
        self.requeued.pop_front().or_else(|| self.normal.pop_front())
    }
}

/// In-memory implementation of [`WaitlistChannel`].
///
/// Ordering is strict priority tiers (requeued before normal, FIFO within a
/// tier), enqueues are deduplicated against an enqueue log that survives
/// dequeues, and [`fail_next_enqueues`](Self::fail_next_enqueues) injects
/// transient failures that — like a production rollback — leave no log marker
/// behind.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWaitlistChannel {
    queues: Arc<Mutex<HashMap<QueueId, QueueState>>>,
    failures: Arc<AtomicU32>,
}

impl InMemoryWaitlistChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` enqueue attempts fail with a transient error.
    ///
    /// Failed attempts record nothing, so a retry of the same enqueue is not
    /// treated as a duplicate — mirroring the marker-rollback contract of the
    /// production channel.
    pub fn fail_next_enqueues(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Booking ids currently queued, head first. Test inspection helper.
    #[must_use]
    pub fn queued_booking_ids(&self, queue: &QueueId) -> Vec<admission_core::types::BookingId> {
        let map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(queue).map_or_else(Vec::new, |state| {
            state
                .requeued
                .iter()
                .chain(state.normal.iter())
                .map(|entry| entry.booking_id)
                .collect()
        })
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current > 0).then(|| current - 1)
            })
            .is_ok()
    }
}

impl WaitlistChannel for InMemoryWaitlistChannel {
    fn enqueue<'a>(
        &'a self,
        queue: &'a QueueId,
        entry: WaitlistEntry,
    ) -> ChannelFuture<'a, EnqueueOutcome> {
        Box::pin(async move {
            if self.take_failure() {
                return Err(ChannelError::EnqueueFailed {
                    queue: queue.to_string(),
                    reason: "injected transient failure".to_string(),
                });
            }
            let mut map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            let state = map.entry(queue.clone()).or_default();
            if state.log.contains(&entry.idempotency_key) {
                return Ok(EnqueueOutcome::Duplicate);
            }
            state.log.insert(entry.idempotency_key.clone());
            state.push(entry);
            Ok(EnqueueOutcome::Enqueued)
        })
    }

    fn dequeue_next<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, Option<WaitlistEntry>> {
        Box::pin(async move {
            let mut map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(map.get_mut(queue).and_then(QueueState::pop))
        })
    }

    fn requeue<'a>(&'a self, queue: &'a QueueId, entry: WaitlistEntry) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(queue.clone()).or_default().push(entry);
            Ok(())
        })
    }

    fn remove_where<'a>(
        &'a self,
        queue: &'a QueueId,
        predicate: RemovePredicate<'a>,
    ) -> ChannelFuture<'a, Vec<WaitlistEntry>> {
        Box::pin(async move {
            let mut map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(state) = map.get_mut(queue) else {
                return Ok(Vec::new());
            };

            // Drain both tiers, keep survivors in their original relative
            // order and tier. The enqueue log is untouched: this is a
            // reconstruction, not a new enqueue.
            let mut removed = Vec::new();
            for tier in [&mut state.requeued, &mut state.normal] {
                let drained: Vec<WaitlistEntry> = tier.drain(..).collect();
                for entry in drained {
                    if predicate(&entry) {
                        removed.push(entry);
                    } else {
                        tier.push_back(entry);
                    }
                }
            }
            Ok(removed)
        })
    }

    fn contains<'a>(
        &'a self,
        queue: &'a QueueId,
        key: &'a IdempotencyKey,
    ) -> ChannelFuture<'a, bool> {
        Box::pin(async move {
            let map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(map.get(queue).is_some_and(|state| {
                state
                    .requeued
                    .iter()
                    .chain(state.normal.iter())
                    .any(|entry| entry.idempotency_key == *key)
            }))
        })
    }

    fn purge<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, usize> {
        Box::pin(async move {
            let mut map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(map.remove(queue).map_or(0, |state| state.depth()))
        })
    }

    fn depth<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, usize> {
        Box::pin(async move {
            let map = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(map.get(queue).map_or(0, QueueState::depth))
        })
    }
}
