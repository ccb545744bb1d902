//! Record store traits for bookings and conferences.
//!
//! The admission core treats persistence as a collaborator: it needs durable
//! booking and conference records with optimistic concurrency, nothing more.
//! Two implementations exist:
//!
//! - `PgBookingStore` / `PgConferenceStore` (in `admission-postgres`): production
//! - `InMemoryBookingStore` / `InMemoryConferenceStore` (in `admission-testing`):
//!   fast, deterministic testing
//!
//! # Optimistic concurrency
//!
//! `save` is a version-checked upsert. A record at version 0 must not exist
//! yet; a record at version `n > 0` must currently be stored at version `n`.
//! On success the store bumps the version and returns the stored copy. A
//! mismatch means another writer got there first and the caller must re-read —
//! stale writes are rejected, never merged.
//!
//! # Dyn compatibility
//!
//! Trait methods return explicit `Pin<Box<dyn Future>>` instead of `async fn`
//! so the traits can be used as trait objects (`Arc<dyn BookingStore>`)
//! injected into the engine.

use crate::types::{Booking, BookingId, BookingStatus, Conference, ConferenceId, UserId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store trait methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during record store operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the record was modified since it was
    /// read. The caller should re-read and retry.
    #[error("version conflict on {record}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Identifier of the conflicting record.
        record: String,
        /// The version the write expected.
        expected: u64,
        /// The version actually stored.
        actual: u64,
    },

    /// The referenced record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Backend connection or query failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Failed to map a stored row to a domain type.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Durable store of booking records.
///
/// Mutations for a single booking id are serialized by the version check:
/// no two transitions for the same booking can be applied out of order.
pub trait BookingStore: Send + Sync {
    /// Version-checked upsert; returns the stored copy with its new version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] if the stored version differs from
    ///   the one carried by `booking`
    /// - [`StoreError::Backend`] on connection or query failure
    fn save(&self, booking: Booking) -> StoreFuture<'_, Booking>;

    /// Look up a booking by id. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn find_by_id(&self, id: &BookingId) -> StoreFuture<'_, Option<Booking>>;

    /// All bookings ever created by a user, any status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn find_by_user(&self, user_id: &UserId) -> StoreFuture<'_, Vec<Booking>>;

    /// All bookings currently in `status`, across conferences.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn find_by_status(&self, status: BookingStatus) -> StoreFuture<'_, Vec<Booking>>;

    /// All bookings for one conference currently in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn find_by_conference_and_status(
        &self,
        conference_id: &ConferenceId,
        status: BookingStatus,
    ) -> StoreFuture<'_, Vec<Booking>>;
}

/// Durable store of conference records.
pub trait ConferenceStore: Send + Sync {
    /// Version-checked upsert; returns the stored copy with its new version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`] if the stored version differs from
    ///   the one carried by `conference`
    /// - [`StoreError::Backend`] on connection or query failure
    fn save(&self, conference: Conference) -> StoreFuture<'_, Conference>;

    /// Look up a conference by id. `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn find_by_id(&self, id: &ConferenceId) -> StoreFuture<'_, Option<Conference>>;

    /// All conference records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] on connection or query failure.
    fn find_all(&self) -> StoreFuture<'_, Vec<Conference>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_display_names_both_versions() {
        let error = StoreError::VersionConflict {
            record: "booking 42".to_string(),
            expected: 5,
            actual: 7,
        };
        let display = format!("{error}");
        assert!(display.contains("expected version 5"));
        assert!(display.contains("found 7"));
    }
}
