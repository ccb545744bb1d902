//! Table-backed waitlist channel.
//!
//! One logical queue per conference lives in `waitlist_entries`, ordered by
//! `(priority DESC, id ASC)` — strict priority tiers, FIFO within a tier via
//! the serial id. Idempotent enqueue is enforced by `waitlist_enqueue_log`:
//! the log marker and the entry are inserted in one transaction, so a failed
//! enqueue rolls its marker back and a duplicate key insert affects zero log
//! rows and appends nothing.
//!
//! `dequeue_next` pops with `FOR UPDATE SKIP LOCKED`, so concurrent poppers
//! on the same queue never receive the same entry. `remove_where` locks the
//! queue's rows, applies the predicate in memory and deletes the matches in
//! the same transaction — survivors keep their ids, hence their order and
//! priority.

use admission_core::channel::{
    ChannelError, ChannelFuture, EnqueueOutcome, RemovePredicate, WaitlistChannel,
};
use admission_core::types::{BookingId, IdempotencyKey, Priority, QueueId, WaitlistEntry};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

/// `PostgreSQL` implementation of [`WaitlistChannel`].
#[derive(Clone, Debug)]
pub struct PgWaitlistChannel {
    pool: PgPool,
}

impl PgWaitlistChannel {
    /// Creates a channel over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_entry(row: &PgRow) -> Result<WaitlistEntry, ChannelError> {
    let booking_id: Uuid = row
        .try_get("booking_id")
        .map_err(|e| ChannelError::CorruptEntry(e.to_string()))?;
    let key: String = row
        .try_get("idempotency_key")
        .map_err(|e| ChannelError::CorruptEntry(e.to_string()))?;
    let priority: i16 = row
        .try_get("priority")
        .map_err(|e| ChannelError::CorruptEntry(e.to_string()))?;

    Ok(WaitlistEntry {
        booking_id: BookingId::from_uuid(booking_id),
        enqueued_at: row
            .try_get("enqueued_at")
            .map_err(|e| ChannelError::CorruptEntry(e.to_string()))?,
        idempotency_key: IdempotencyKey::from_string(key),
        priority: Priority::from_rank(priority),
    })
}

const ENTRY_COLUMNS: &str = "booking_id, enqueued_at, idempotency_key, priority";

impl WaitlistChannel for PgWaitlistChannel {
    fn enqueue<'a>(
        &'a self,
        queue: &'a QueueId,
        entry: WaitlistEntry,
    ) -> ChannelFuture<'a, EnqueueOutcome> {
        Box::pin(async move {
            let fail = |e: sqlx::Error| ChannelError::EnqueueFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            };

            // Marker and entry land in one transaction: a failure after the
            // marker insert rolls the marker back, so a genuine retry is not
            // permanently blocked.
            let mut tx = self.pool.begin().await.map_err(fail)?;

            let marker = sqlx::query(
                "INSERT INTO waitlist_enqueue_log (queue_id, idempotency_key) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(queue.as_str())
            .bind(entry.idempotency_key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

            if marker.rows_affected() == 0 {
                debug!(queue = %queue, key = %entry.idempotency_key, "duplicate enqueue ignored");
                return Ok(EnqueueOutcome::Duplicate);
            }

            sqlx::query(
                "INSERT INTO waitlist_entries \
                 (queue_id, booking_id, enqueued_at, idempotency_key, priority) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(queue.as_str())
            .bind(*entry.booking_id.as_uuid())
            .bind(entry.enqueued_at)
            .bind(entry.idempotency_key.as_str())
            .bind(entry.priority.rank())
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

            tx.commit().await.map_err(fail)?;
            debug!(queue = %queue, booking_id = %entry.booking_id, "waitlist entry enqueued");
            Ok(EnqueueOutcome::Enqueued)
        })
    }

    fn dequeue_next<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, Option<WaitlistEntry>> {
        Box::pin(async move {
            let fail = |e: sqlx::Error| ChannelError::DequeueFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            };

            let row = sqlx::query(&format!(
                "DELETE FROM waitlist_entries WHERE id = ( \
                     SELECT id FROM waitlist_entries WHERE queue_id = $1 \
                     ORDER BY priority DESC, id ASC LIMIT 1 \
                     FOR UPDATE SKIP LOCKED \
                 ) RETURNING {ENTRY_COLUMNS}"
            ))
            .bind(queue.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(fail)?;

            row.as_ref().map(map_entry).transpose()
        })
    }

    fn requeue<'a>(&'a self, queue: &'a QueueId, entry: WaitlistEntry) -> ChannelFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO waitlist_entries \
                 (queue_id, booking_id, enqueued_at, idempotency_key, priority) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(queue.as_str())
            .bind(*entry.booking_id.as_uuid())
            .bind(entry.enqueued_at)
            .bind(entry.idempotency_key.as_str())
            .bind(entry.priority.rank())
            .execute(&self.pool)
            .await
            .map_err(|e| ChannelError::EnqueueFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
            debug!(queue = %queue, booking_id = %entry.booking_id, "waitlist entry requeued");
            Ok(())
        })
    }

    fn remove_where<'a>(
        &'a self,
        queue: &'a QueueId,
        predicate: RemovePredicate<'a>,
    ) -> ChannelFuture<'a, Vec<WaitlistEntry>> {
        Box::pin(async move {
            let fail = |e: sqlx::Error| ChannelError::DrainFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            };

            let mut tx = self.pool.begin().await.map_err(fail)?;

            let rows = sqlx::query(&format!(
                "SELECT id, {ENTRY_COLUMNS} FROM waitlist_entries \
                 WHERE queue_id = $1 ORDER BY priority DESC, id ASC FOR UPDATE"
            ))
            .bind(queue.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(fail)?;

            let mut removed = Vec::new();
            let mut removed_ids: Vec<i64> = Vec::new();
            for row in &rows {
                let entry = map_entry(row)?;
                if predicate(&entry) {
                    removed_ids.push(
                        row.try_get("id")
                            .map_err(|e| ChannelError::CorruptEntry(e.to_string()))?,
                    );
                    removed.push(entry);
                }
            }

            if !removed_ids.is_empty() {
                sqlx::query("DELETE FROM waitlist_entries WHERE id = ANY($1)")
                    .bind(removed_ids)
                    .execute(&mut *tx)
                    .await
                    .map_err(fail)?;
            }

            tx.commit().await.map_err(fail)?;
            debug!(queue = %queue, removed = removed.len(), "selective waitlist removal");
            Ok(removed)
        })
    }

    fn contains<'a>(
        &'a self,
        queue: &'a QueueId,
        key: &'a IdempotencyKey,
    ) -> ChannelFuture<'a, bool> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT EXISTS( \
                     SELECT 1 FROM waitlist_entries \
                     WHERE queue_id = $1 AND idempotency_key = $2 \
                 ) AS present",
            )
            .bind(queue.as_str())
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChannelError::DequeueFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
            row.try_get("present")
                .map_err(|e| ChannelError::CorruptEntry(e.to_string()))
        })
    }

    fn purge<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, usize> {
        Box::pin(async move {
            let fail = |e: sqlx::Error| ChannelError::DrainFailed {
                queue: queue.to_string(),
                reason: e.to_string(),
            };

            let mut tx = self.pool.begin().await.map_err(fail)?;
            let dropped = sqlx::query("DELETE FROM waitlist_entries WHERE queue_id = $1")
                .bind(queue.as_str())
                .execute(&mut *tx)
                .await
                .map_err(fail)?
                .rows_affected();
            sqlx::query("DELETE FROM waitlist_enqueue_log WHERE queue_id = $1")
                .bind(queue.as_str())
                .execute(&mut *tx)
                .await
                .map_err(fail)?;
            tx.commit().await.map_err(fail)?;

            debug!(queue = %queue, dropped, "waitlist queue purged");
            Ok(usize::try_from(dropped).unwrap_or(usize::MAX))
        })
    }

    fn depth<'a>(&'a self, queue: &'a QueueId) -> ChannelFuture<'a, usize> {
        Box::pin(async move {
            let row = sqlx::query("SELECT COUNT(*) AS depth FROM waitlist_entries WHERE queue_id = $1")
                .bind(queue.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| ChannelError::DequeueFailed {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                })?;
            let depth: i64 = row
                .try_get("depth")
                .map_err(|e| ChannelError::CorruptEntry(e.to_string()))?;
            Ok(usize::try_from(depth).unwrap_or(0))
        })
    }
}
