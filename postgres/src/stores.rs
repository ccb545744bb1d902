//! PostgreSQL record stores with optimistic concurrency.
//!
//! `save` is a version-checked upsert: a record at version 0 is inserted (a
//! conflicting primary key means someone else created it first), a record at
//! version `n` is updated with `WHERE version = n` so a stale write affects
//! zero rows and is reported as a conflict instead of silently merged.

use admission_core::store::{BookingStore, ConferenceStore, StoreError, StoreFuture};
use admission_core::types::{
    Booking, BookingId, BookingStatus, Conference, ConferenceId, QueueId, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

fn stored_version(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| corrupt(format!("negative version column: {raw}")))
}

// ============================================================================
// Bookings
// ============================================================================

/// `PostgreSQL` implementation of [`BookingStore`].
#[derive(Clone, Debug)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, id: &BookingId) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT version FROM bookings WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => stored_version(row.try_get("version").map_err(corrupt)?),
            None => Ok(0),
        }
    }
}

fn map_booking(row: &PgRow) -> Result<Booking, StoreError> {
    let status_raw: String = row.try_get("status").map_err(corrupt)?;
    let status = BookingStatus::parse(&status_raw).map_err(StoreError::Corrupt)?;
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let user_id: Uuid = row.try_get("user_id").map_err(corrupt)?;
    let conference_id: Uuid = row.try_get("conference_id").map_err(corrupt)?;
    let version: i64 = row.try_get("version").map_err(corrupt)?;

    Ok(Booking {
        id: BookingId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        conference_id: ConferenceId::from_uuid(conference_id),
        created_at: row.try_get("created_at").map_err(corrupt)?,
        last_transition_at: row.try_get("last_transition_at").map_err(corrupt)?,
        status,
        version: stored_version(version)?,
    })
}

const BOOKING_COLUMNS: &str =
    "id, user_id, conference_id, created_at, last_transition_at, status, version";

impl BookingStore for PgBookingStore {
    fn save(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            let expected =
                i64::try_from(booking.version).map_err(|_| corrupt("version overflow"))?;

            let rows_affected = if expected == 0 {
                sqlx::query(
                    "INSERT INTO bookings \
                     (id, user_id, conference_id, created_at, last_transition_at, status, version) \
                     VALUES ($1, $2, $3, $4, $5, $6, 1) \
                     ON CONFLICT (id) DO NOTHING",
                )
                .bind(*booking.id.as_uuid())
                .bind(*booking.user_id.as_uuid())
                .bind(*booking.conference_id.as_uuid())
                .bind(booking.created_at)
                .bind(booking.last_transition_at)
                .bind(booking.status.as_str())
                .execute(&self.pool)
                .await
                .map_err(backend)?
                .rows_affected()
            } else {
                sqlx::query(
                    "UPDATE bookings SET \
                     last_transition_at = $2, status = $3, version = version + 1 \
                     WHERE id = $1 AND version = $4",
                )
                .bind(*booking.id.as_uuid())
                .bind(booking.last_transition_at)
                .bind(booking.status.as_str())
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(backend)?
                .rows_affected()
            };

            if rows_affected == 0 {
                let actual = self.current_version(&booking.id).await?;
                return Err(StoreError::VersionConflict {
                    record: format!("booking {}", booking.id),
                    expected: booking.version,
                    actual,
                });
            }

            let mut saved = booking;
            saved.version += 1;
            debug!(booking_id = %saved.id, version = saved.version, "booking saved");
            Ok(saved)
        })
    }

    fn find_by_id(&self, id: &BookingId) -> StoreFuture<'_, Option<Booking>> {
        let id = *id;
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
            row.as_ref().map(map_booking).transpose()
        })
    }

    fn find_by_user(&self, user_id: &UserId) -> StoreFuture<'_, Vec<Booking>> {
        let user_id = *user_id;
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at"
            ))
            .bind(*user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
            rows.iter().map(map_booking).collect()
        })
    }

    fn find_by_status(&self, status: BookingStatus) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = $1 ORDER BY created_at"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
            rows.iter().map(map_booking).collect()
        })
    }

    fn find_by_conference_and_status(
        &self,
        conference_id: &ConferenceId,
        status: BookingStatus,
    ) -> StoreFuture<'_, Vec<Booking>> {
        let conference_id = *conference_id;
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings \
                 WHERE conference_id = $1 AND status = $2 ORDER BY created_at"
            ))
            .bind(*conference_id.as_uuid())
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
            rows.iter().map(map_booking).collect()
        })
    }
}

// ============================================================================
// Conferences
// ============================================================================

/// `PostgreSQL` implementation of [`ConferenceStore`].
#[derive(Clone, Debug)]
pub struct PgConferenceStore {
    pool: PgPool,
}

impl PgConferenceStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, id: &ConferenceId) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT version FROM conferences WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            Some(row) => stored_version(row.try_get("version").map_err(corrupt)?),
            None => Ok(0),
        }
    }
}

fn map_conference(row: &PgRow) -> Result<Conference, StoreError> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let total_slots: i32 = row.try_get("total_slots").map_err(corrupt)?;
    let available_slots: i32 = row.try_get("available_slots").map_err(corrupt)?;
    let waitlist_queue: Option<String> = row.try_get("waitlist_queue").map_err(corrupt)?;
    let topics: serde_json::Value = row.try_get("topics").map_err(corrupt)?;
    let version: i64 = row.try_get("version").map_err(corrupt)?;

    Ok(Conference {
        id: ConferenceId::from_uuid(id),
        name: row.try_get("name").map_err(corrupt)?,
        location: row.try_get("location").map_err(corrupt)?,
        start_time: row.try_get("start_time").map_err(corrupt)?,
        end_time: row.try_get("end_time").map_err(corrupt)?,
        total_slots: u32::try_from(total_slots).map_err(corrupt)?,
        available_slots: u32::try_from(available_slots).map_err(corrupt)?,
        waitlist_queue: waitlist_queue.map(QueueId::from_string),
        fully_booked: row.try_get("fully_booked").map_err(corrupt)?,
        topics: serde_json::from_value(topics).map_err(corrupt)?,
        version: stored_version(version)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
    })
}

const CONFERENCE_COLUMNS: &str = "id, name, location, start_time, end_time, total_slots, \
     available_slots, waitlist_queue, fully_booked, topics, version, created_at";

impl ConferenceStore for PgConferenceStore {
    fn save(&self, conference: Conference) -> StoreFuture<'_, Conference> {
        Box::pin(async move {
            let expected =
                i64::try_from(conference.version).map_err(|_| corrupt("version overflow"))?;
            let total = i32::try_from(conference.total_slots).map_err(corrupt)?;
            let available = i32::try_from(conference.available_slots).map_err(corrupt)?;
            let queue = conference
                .waitlist_queue
                .as_ref()
                .map(|q| q.as_str().to_string());
            let topics = serde_json::to_value(&conference.topics).map_err(corrupt)?;

            let rows_affected = if expected == 0 {
                sqlx::query(
                    "INSERT INTO conferences \
                     (id, name, location, start_time, end_time, total_slots, available_slots, \
                      waitlist_queue, fully_booked, topics, version, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11) \
                     ON CONFLICT (id) DO NOTHING",
                )
                .bind(*conference.id.as_uuid())
                .bind(&conference.name)
                .bind(&conference.location)
                .bind(conference.start_time)
                .bind(conference.end_time)
                .bind(total)
                .bind(available)
                .bind(&queue)
                .bind(conference.fully_booked)
                .bind(&topics)
                .bind(conference.created_at)
                .execute(&self.pool)
                .await
                .map_err(backend)?
                .rows_affected()
            } else {
                sqlx::query(
                    "UPDATE conferences SET \
                     name = $2, location = $3, start_time = $4, end_time = $5, \
                     total_slots = $6, available_slots = $7, waitlist_queue = $8, \
                     fully_booked = $9, topics = $10, version = version + 1 \
                     WHERE id = $1 AND version = $11",
                )
                .bind(*conference.id.as_uuid())
                .bind(&conference.name)
                .bind(&conference.location)
                .bind(conference.start_time)
                .bind(conference.end_time)
                .bind(total)
                .bind(available)
                .bind(&queue)
                .bind(conference.fully_booked)
                .bind(&topics)
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(backend)?
                .rows_affected()
            };

            if rows_affected == 0 {
                let actual = self.current_version(&conference.id).await?;
                return Err(StoreError::VersionConflict {
                    record: format!("conference {}", conference.id),
                    expected: conference.version,
                    actual,
                });
            }

            let mut saved = conference;
            saved.version += 1;
            debug!(conference_id = %saved.id, version = saved.version, "conference saved");
            Ok(saved)
        })
    }

    fn find_by_id(&self, id: &ConferenceId) -> StoreFuture<'_, Option<Conference>> {
        let id = *id;
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {CONFERENCE_COLUMNS} FROM conferences WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
            row.as_ref().map(map_conference).transpose()
        })
    }

    fn find_all(&self) -> StoreFuture<'_, Vec<Conference>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {CONFERENCE_COLUMNS} FROM conferences ORDER BY created_at"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
            rows.iter().map(map_conference).collect()
        })
    }
}
