//! In-memory record stores with the same optimistic-concurrency semantics as
//! the Postgres implementations.
//!
//! All reads and writes go through one mutex per store, so a version-checked
//! save observes and mutates the map atomically — the conflict behavior under
//! concurrent writers matches production.

use admission_core::store::{BookingStore, ConferenceStore, StoreError, StoreFuture};
use admission_core::types::{Booking, BookingId, BookingStatus, Conference, ConferenceId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// In-memory implementation of [`BookingStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<Mutex<HashMap<BookingId, Booking>>>,
}

impl InMemoryBookingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bookings ever saved (any status).
    #[must_use]
    pub fn len(&self) -> usize {
        self.bookings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no bookings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BookingStore for InMemoryBookingStore {
    fn save(&self, mut booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            let mut map = self
                .bookings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let actual = map.get(&booking.id).map_or(0, |stored| stored.version);
            if booking.version != actual {
                return Err(StoreError::VersionConflict {
                    record: format!("booking {}", booking.id),
                    expected: booking.version,
                    actual,
                });
            }
            booking.version += 1;
            map.insert(booking.id, booking.clone());
            Ok(booking)
        })
    }

    fn find_by_id(&self, id: &BookingId) -> StoreFuture<'_, Option<Booking>> {
        let id = *id;
        Box::pin(async move {
            let map = self
                .bookings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Ok(map.get(&id).cloned())
        })
    }

    fn find_by_user(&self, user_id: &UserId) -> StoreFuture<'_, Vec<Booking>> {
        let user_id = *user_id;
        Box::pin(async move {
            let map = self
                .bookings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut found: Vec<Booking> = map
                .values()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect();
            found.sort_by_key(|b| b.created_at);
            Ok(found)
        })
    }

    fn find_by_status(&self, status: BookingStatus) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let map = self
                .bookings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut found: Vec<Booking> = map
                .values()
                .filter(|b| b.status == status)
                .cloned()
                .collect();
            found.sort_by_key(|b| b.created_at);
            Ok(found)
        })
    }

    fn find_by_conference_and_status(
        &self,
        conference_id: &ConferenceId,
        status: BookingStatus,
    ) -> StoreFuture<'_, Vec<Booking>> {
        let conference_id = *conference_id;
        Box::pin(async move {
            let map = self
                .bookings
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut found: Vec<Booking> = map
                .values()
                .filter(|b| b.conference_id == conference_id && b.status == status)
                .cloned()
                .collect();
            found.sort_by_key(|b| b.created_at);
            Ok(found)
        })
    }
}

/// In-memory implementation of [`ConferenceStore`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryConferenceStore {
    conferences: Arc<Mutex<HashMap<ConferenceId, Conference>>>,
}

impl InMemoryConferenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConferenceStore for InMemoryConferenceStore {
    fn save(&self, mut conference: Conference) -> StoreFuture<'_, Conference> {
        Box::pin(async move {
            let mut map = self
                .conferences
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let actual = map.get(&conference.id).map_or(0, |stored| stored.version);
            if conference.version != actual {
                return Err(StoreError::VersionConflict {
                    record: format!("conference {}", conference.id),
                    expected: conference.version,
                    actual,
                });
            }
            conference.version += 1;
            map.insert(conference.id, conference.clone());
            Ok(conference)
        })
    }

    fn find_by_id(&self, id: &ConferenceId) -> StoreFuture<'_, Option<Conference>> {
        let id = *id;
        Box::pin(async move {
            let map = self
                .conferences
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Ok(map.get(&id).cloned())
        })
    }

    fn find_all(&self) -> StoreFuture<'_, Vec<Conference>> {
        Box::pin(async move {
            let map = self
                .conferences
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut all: Vec<Conference> = map.values().cloned().collect();
            all.sort_by_key(|c| c.created_at);
            Ok(all)
        })
    }
}
