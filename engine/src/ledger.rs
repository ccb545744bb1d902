//! Slot ledger: linearizable seat accounting per conference.
//!
//! All `available_slots` mutations in the system go through this ledger. It
//! uses optimistic concurrency against the conference store's version column:
//! read, mutate, save with the version observed, retry on conflict. Under
//! concurrent callers for the same conference, at most one writer per version
//! wins, so two reserves can never both take the last seat and a release can
//! never push the count past `total_slots`.

use admission_core::store::{ConferenceStore, StoreError};
use admission_core::types::ConferenceId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Seat accounting with optimistic-retry updates.
#[derive(Clone)]
pub struct SlotLedger {
    conferences: Arc<dyn ConferenceStore>,
    max_attempts: u32,
}

impl SlotLedger {
    /// Creates a ledger over the given conference store.
    ///
    /// `max_attempts` bounds how often an update is retried after losing a
    /// version race before the conflict is reported to the caller.
    #[must_use]
    pub fn new(conferences: Arc<dyn ConferenceStore>, max_attempts: u32) -> Self {
        Self {
            conferences,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Atomically take one seat if any is free.
    ///
    /// Returns whether a seat was granted. `Ok(false)` means the conference
    /// is out of seats — not an error, the caller decides what that means.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the conference does not exist
    /// - [`StoreError::VersionConflict`] if every retry lost its race
    /// - [`StoreError::Backend`] on storage failure
    pub async fn reserve(&self, conference_id: &ConferenceId) -> Result<bool, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut conference) = self.conferences.find_by_id(conference_id).await? else {
                return Err(StoreError::NotFound(format!("conference {conference_id}")));
            };
            if !conference.has_free_slot() {
                debug!(%conference_id, "reserve refused: no free slots");
                return Ok(false);
            }
            conference.available_slots -= 1;
            match self.conferences.save(conference).await {
                Ok(saved) => {
                    debug!(
                        %conference_id,
                        available = saved.available_slots,
                        total = saved.total_slots,
                        "seat reserved"
                    );
                    return Ok(true);
                },
                Err(StoreError::VersionConflict { .. }) if attempt < self.max_attempts => {
                    debug!(%conference_id, attempt, "reserve lost version race, retrying");
                    tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 5)).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Atomically return one seat, capped at `total_slots`.
    ///
    /// A release against an already-full conference is logged and ignored
    /// rather than overcounting.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the conference does not exist
    /// - [`StoreError::VersionConflict`] if every retry lost its race
    /// - [`StoreError::Backend`] on storage failure
    pub async fn release(&self, conference_id: &ConferenceId) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut conference) = self.conferences.find_by_id(conference_id).await? else {
                return Err(StoreError::NotFound(format!("conference {conference_id}")));
            };
            if conference.available_slots >= conference.total_slots {
                warn!(
                    %conference_id,
                    available = conference.available_slots,
                    total = conference.total_slots,
                    "release ignored: conference already at full capacity"
                );
                return Ok(());
            }
            conference.available_slots += 1;
            match self.conferences.save(conference).await {
                Ok(saved) => {
                    debug!(
                        %conference_id,
                        available = saved.available_slots,
                        total = saved.total_slots,
                        "seat released"
                    );
                    return Ok(());
                },
                Err(StoreError::VersionConflict { .. }) if attempt < self.max_attempts => {
                    debug!(%conference_id, attempt, "release lost version race, retrying");
                    tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 5)).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use admission_core::types::Conference;
    use admission_testing::InMemoryConferenceStore;
    use chrono::Utc;

    fn conference(slots: u32) -> Conference {
        Conference::new(
            "RustConf".to_string(),
            "Portland".to_string(),
            Utc::now() + chrono::Duration::days(1),
            Utc::now() + chrono::Duration::days(2),
            slots,
            Utc::now(),
        )
    }

    async fn seeded(slots: u32) -> (SlotLedger, Arc<InMemoryConferenceStore>, ConferenceId) {
        let store = Arc::new(InMemoryConferenceStore::new());
        let conference = store.save(conference(slots)).await.unwrap();
        (SlotLedger::new(store.clone(), 5), store, conference.id)
    }

    #[tokio::test]
    async fn reserve_stops_at_zero() {
        let (ledger, store, id) = seeded(2).await;
        assert!(ledger.reserve(&id).await.unwrap());
        assert!(ledger.reserve(&id).await.unwrap());
        assert!(!ledger.reserve(&id).await.unwrap());
        assert_eq!(store.find_by_id(&id).await.unwrap().unwrap().available_slots, 0);
    }

    #[tokio::test]
    async fn release_is_capped_at_total() {
        let (ledger, store, id) = seeded(1).await;
        ledger.release(&id).await.unwrap();
        ledger.release(&id).await.unwrap();
        assert_eq!(store.find_by_id(&id).await.unwrap().unwrap().available_slots, 1);
    }

    #[tokio::test]
    async fn unknown_conference_is_reported() {
        let store = Arc::new(InMemoryConferenceStore::new());
        let ledger = SlotLedger::new(store, 3);
        let err = ledger.reserve(&ConferenceId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_reserves_never_oversell_the_last_seat() {
        let (ledger, store, id) = seeded(1).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.reserve(&id).await }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(store.find_by_id(&id).await.unwrap().unwrap().available_slots, 0);
    }

    #[test]
    fn capacity_invariant_holds_under_arbitrary_interleavings() {
        use proptest::prelude::*;

        proptest!(|(ops in proptest::collection::vec(any::<bool>(), 0..64), total in 1u32..8)| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let outcome: Result<(), TestCaseError> = runtime.block_on(async {
                let store = Arc::new(InMemoryConferenceStore::new());
                let saved = store.save(conference(total)).await.unwrap();
                let ledger = SlotLedger::new(store.clone(), 5);

                for reserve in ops {
                    if reserve {
                        let _ = ledger.reserve(&saved.id).await.unwrap();
                    } else {
                        ledger.release(&saved.id).await.unwrap();
                    }
                    let current = store.find_by_id(&saved.id).await.unwrap().unwrap();
                    prop_assert!(current.available_slots <= current.total_slots);
                }
                Ok(())
            });
            prop_assert!(outcome.is_ok(), "capacity invariant violated: {outcome:?}");
        });
    }
}
