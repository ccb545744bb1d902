//! Idempotent schema bootstrap.
//!
//! Every statement is `CREATE .. IF NOT EXISTS`, so `ensure_schema` is safe
//! to run on every startup.

use sqlx::PgPool;

/// DDL statements, applied in order.
pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS conferences (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        location TEXT NOT NULL,
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ NOT NULL,
        total_slots INTEGER NOT NULL,
        available_slots INTEGER NOT NULL,
        waitlist_queue TEXT,
        fully_booked BOOLEAN NOT NULL DEFAULT FALSE,
        topics JSONB NOT NULL DEFAULT '[]',
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT conferences_slots_bounds
            CHECK (available_slots >= 0 AND available_slots <= total_slots)
    )",
    "CREATE TABLE IF NOT EXISTS bookings (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL,
        conference_id UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        last_transition_at TIMESTAMPTZ NOT NULL,
        status TEXT NOT NULL,
        version BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS bookings_user_idx ON bookings (user_id)",
    "CREATE INDEX IF NOT EXISTS bookings_status_idx ON bookings (status)",
    "CREATE INDEX IF NOT EXISTS bookings_conference_status_idx
        ON bookings (conference_id, status)",
    "CREATE TABLE IF NOT EXISTS waitlist_entries (
        id BIGSERIAL PRIMARY KEY,
        queue_id TEXT NOT NULL,
        booking_id UUID NOT NULL,
        enqueued_at TIMESTAMPTZ NOT NULL,
        idempotency_key TEXT NOT NULL,
        priority SMALLINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS waitlist_entries_order_idx
        ON waitlist_entries (queue_id, priority DESC, id ASC)",
    "CREATE TABLE IF NOT EXISTS waitlist_enqueue_log (
        queue_id TEXT NOT NULL,
        idempotency_key TEXT NOT NULL,
        PRIMARY KEY (queue_id, idempotency_key)
    )",
];

/// Create all tables and indexes if they do not exist yet.
///
/// # Errors
///
/// Returns the underlying `sqlx` error when a statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = SCHEMA.len(), "admission schema ensured");
    Ok(())
}
