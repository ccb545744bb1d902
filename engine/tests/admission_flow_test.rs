//! End-to-end admission flows against the in-memory collaborators.
//!
//! Each test drives the public engine operations and asserts on the three
//! authorities the engine must keep consistent: booking records, the slot
//! ledger and the waitlist channel.
//!
//! Run with: `cargo test --test admission_flow_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use admission_core::Clock;
use admission_core::channel::WaitlistChannel;
use admission_core::error::AdmissionError;
use admission_core::store::{BookingStore, ConferenceStore};
use admission_core::types::{
    Booking, BookingId, BookingStatus, Conference, ConferenceId, UserId, WaitlistEntry,
};
use admission_engine::{AdmissionConfig, AdmissionEngine};
use admission_testing::{
    FixedClock, InMemoryBookingStore, InMemoryConferenceStore, InMemoryWaitlistChannel, test_clock,
};
use chrono::Duration;
use std::sync::Arc;

struct TestSystem {
    engine: Arc<AdmissionEngine>,
    bookings: Arc<InMemoryBookingStore>,
    conferences: Arc<InMemoryConferenceStore>,
    channel: Arc<InMemoryWaitlistChannel>,
    clock: FixedClock,
}

fn system() -> TestSystem {
    admission_testing::init_tracing();
    let clock = test_clock();
    let bookings = Arc::new(InMemoryBookingStore::new());
    let conferences = Arc::new(InMemoryConferenceStore::new());
    let channel = Arc::new(InMemoryWaitlistChannel::new());
    let engine = Arc::new(AdmissionEngine::new(
        bookings.clone(),
        conferences.clone(),
        channel.clone(),
        Arc::new(clock.clone()),
        AdmissionConfig::default(),
    ));
    TestSystem {
        engine,
        bookings,
        conferences,
        channel,
        clock,
    }
}

impl TestSystem {
    /// Seed a conference starting `starts_in` from now and running for
    /// `lasts`.
    async fn conference(&self, name: &str, slots: u32, starts_in: Duration, lasts: Duration) -> Conference {
        let now = self.clock.now();
        let conference = Conference::new(
            name.to_string(),
            "Portland".to_string(),
            now + starts_in,
            now + starts_in + lasts,
            slots,
            now,
        );
        self.conferences.save(conference).await.unwrap()
    }

    /// A conference starting tomorrow with the given capacity.
    async fn tomorrow(&self, slots: u32) -> Conference {
        self.conference("RustConf", slots, Duration::hours(24), Duration::hours(8))
            .await
    }

    async fn available(&self, id: ConferenceId) -> u32 {
        self.conferences
            .find_by_id(&id)
            .await
            .unwrap()
            .unwrap()
            .available_slots
    }

    async fn status_of(&self, id: BookingId) -> BookingStatus {
        self.bookings.find_by_id(&id).await.unwrap().unwrap().status
    }

    async fn queue_depth(&self, conference_id: ConferenceId) -> usize {
        let conference = self
            .conferences
            .find_by_id(&conference_id)
            .await
            .unwrap()
            .unwrap();
        match conference.waitlist_queue {
            Some(queue) => self.channel.depth(&queue).await.unwrap(),
            None => 0,
        }
    }
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn booking_confirms_directly_while_seats_are_free() {
    let sys = system();
    let conference = sys.tomorrow(2).await;

    let booking = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(sys.available(conference.id).await, 1);
    // No overflow yet, so no queue was created.
    assert!(sys
        .conferences
        .find_by_id(&conference.id)
        .await
        .unwrap()
        .unwrap()
        .waitlist_queue
        .is_none());
}

#[tokio::test]
async fn overflow_waitlists_and_creates_the_queue_lazily() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    sys.engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let overflow = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    assert_eq!(overflow.status, BookingStatus::Waitlisted);
    assert_eq!(sys.available(conference.id).await, 0);
    assert_eq!(sys.queue_depth(conference.id).await, 1);
}

#[tokio::test]
async fn second_active_booking_for_same_conference_is_rejected() {
    let sys = system();
    let conference = sys.tomorrow(5).await;
    let user = UserId::new();

    let first = sys.engine.create_booking(user, conference.id).await.unwrap();
    let err = sys.engine.create_booking(user, conference.id).await.unwrap_err();

    let AdmissionError::DuplicateBooking { existing } = err else {
        panic!("expected DuplicateBooking, got {err}");
    };
    assert_eq!(existing, first.id);

    // After cancelling, the user may book again.
    sys.engine.cancel_booking(first.id).await.unwrap();
    sys.engine.create_booking(user, conference.id).await.unwrap();
}

#[tokio::test]
async fn booking_after_conference_start_is_rejected() {
    let sys = system();
    let conference = sys.conference("Started", 5, Duration::hours(1), Duration::hours(4)).await;

    sys.clock.advance(Duration::hours(2));
    let err = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyStarted { .. }));
}

#[tokio::test]
async fn booking_overlapping_a_confirmed_conference_is_rejected_with_reasons() {
    let sys = system();
    let first = sys
        .conference("First", 5, Duration::hours(24), Duration::hours(3))
        .await;
    let clashing = sys
        .conference("Clashing", 5, Duration::hours(25), Duration::hours(3))
        .await;
    let user = UserId::new();

    sys.engine.create_booking(user, first.id).await.unwrap();
    let err = sys.engine.create_booking(user, clashing.id).await.unwrap_err();

    let AdmissionError::Validation { reasons } = err else {
        panic!("expected Validation, got {err}");
    };
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("time conflict"));
}

// ============================================================================
// Cancellation and promotion
// ============================================================================

#[tokio::test]
async fn cancelling_confirmed_promotes_exactly_the_head_and_keeps_slots_unchanged() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let head = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let tail = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    assert_eq!(sys.available(conference.id).await, 0);
    sys.engine.cancel_booking(holder.id).await.unwrap();

    // Release then immediate re-reserve: the freed seat is tentatively held
    // by the promoted booking, so the count is unchanged.
    assert_eq!(sys.available(conference.id).await, 0);
    assert_eq!(sys.status_of(head.id).await, BookingStatus::Processing);
    assert_eq!(sys.status_of(tail.id).await, BookingStatus::Waitlisted);
    assert_eq!(sys.queue_depth(conference.id).await, 1);
}

#[tokio::test]
async fn full_house_scenario_promote_then_confirm() {
    let sys = system();
    let conference = sys.tomorrow(1).await;
    let user_a = UserId::new();
    let user_b = UserId::new();

    let a = sys.engine.create_booking(user_a, conference.id).await.unwrap();
    assert_eq!(a.status, BookingStatus::Confirmed);
    assert_eq!(sys.available(conference.id).await, 0);

    let b = sys.engine.create_booking(user_b, conference.id).await.unwrap();
    assert_eq!(b.status, BookingStatus::Waitlisted);

    sys.engine.cancel_booking(a.id).await.unwrap();
    assert_eq!(sys.status_of(b.id).await, BookingStatus::Processing);

    sys.clock.advance(Duration::minutes(30));
    let confirmed = sys.engine.confirm_waitlist_booking(b.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(sys.available(conference.id).await, 0);
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let sys = system();
    let conference = sys.tomorrow(1).await;
    let booking = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    sys.engine.cancel_booking(booking.id).await.unwrap();
    let err = sys.engine.cancel_booking(booking.id).await.unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyCancelled(_)));
}

#[tokio::test]
async fn cancelling_waitlisted_removes_its_entry_without_touching_the_ledger() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    sys.engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let waitlisted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    assert_eq!(sys.queue_depth(conference.id).await, 1);

    sys.engine.cancel_booking(waitlisted.id).await.unwrap();

    assert_eq!(sys.status_of(waitlisted.id).await, BookingStatus::Cancelled);
    assert_eq!(sys.queue_depth(conference.id).await, 0);
    assert_eq!(sys.available(conference.id).await, 0);
}

#[tokio::test]
async fn cancelling_processing_releases_the_held_seat_without_promoting() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let promoted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let behind = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    sys.engine.cancel_booking(holder.id).await.unwrap();
    assert_eq!(sys.status_of(promoted.id).await, BookingStatus::Processing);

    sys.engine.cancel_booking(promoted.id).await.unwrap();

    // The tentative hold returns to the pool; the next entry is not promoted
    // until a cancellation or direct booking claims the seat.
    assert_eq!(sys.available(conference.id).await, 1);
    assert_eq!(sys.status_of(behind.id).await, BookingStatus::Waitlisted);
}

#[tokio::test]
async fn stale_entries_are_dropped_at_promotion_time() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let ghost = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    // Cancel the waitlisted booking behind the engine's back, leaving its
    // entry on the channel.
    let mut record = sys.bookings.find_by_id(&ghost.id).await.unwrap().unwrap();
    record
        .transition(BookingStatus::Cancelled, sys.clock.now())
        .unwrap();
    sys.bookings.save(record).await.unwrap();
    assert_eq!(sys.queue_depth(conference.id).await, 1);

    sys.engine.cancel_booking(holder.id).await.unwrap();

    // The stale entry was dropped rather than promoted; the seat stays free.
    assert_eq!(sys.available(conference.id).await, 1);
    assert_eq!(sys.queue_depth(conference.id).await, 0);
}

// ============================================================================
// Confirmation window
// ============================================================================

#[tokio::test]
async fn expired_confirmation_fails_and_persists_the_demotion() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let promoted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    sys.engine.cancel_booking(holder.id).await.unwrap();
    assert_eq!(sys.status_of(promoted.id).await, BookingStatus::Processing);

    sys.clock.advance(Duration::hours(2));
    let err = sys.engine.confirm_waitlist_booking(promoted.id).await.unwrap_err();
    assert!(matches!(err, AdmissionError::ConfirmationExpired { .. }));

    // The demotion persisted even though the call failed.
    assert_eq!(sys.status_of(promoted.id).await, BookingStatus::Waitlisted);
    assert_eq!(sys.available(conference.id).await, 1);
    assert_eq!(sys.queue_depth(conference.id).await, 1);
}

#[tokio::test]
async fn sweep_demotes_expired_processing_bookings() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let promoted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    sys.engine.cancel_booking(holder.id).await.unwrap();

    // Within the window the sweep must not touch it.
    sys.clock.advance(Duration::minutes(59));
    assert_eq!(sys.engine.sweep_expired_processing().await.unwrap(), 0);
    assert_eq!(sys.status_of(promoted.id).await, BookingStatus::Processing);

    sys.clock.advance(Duration::minutes(2));
    assert_eq!(sys.engine.sweep_expired_processing().await.unwrap(), 1);
    assert_eq!(sys.status_of(promoted.id).await, BookingStatus::Waitlisted);
    assert_eq!(sys.available(conference.id).await, 1);
    assert_eq!(sys.queue_depth(conference.id).await, 1);

    // The demotion carries a fresh idempotency key, so the sweep is stable:
    // running it again changes nothing.
    assert_eq!(sys.engine.sweep_expired_processing().await.unwrap(), 0);
    assert_eq!(sys.queue_depth(conference.id).await, 1);
}

#[tokio::test]
async fn confirmation_requires_the_processing_state() {
    let sys = system();
    let conference = sys.tomorrow(2).await;

    let confirmed = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let err = sys
        .engine
        .confirm_waitlist_booking(confirmed.id)
        .await
        .unwrap_err();
    let AdmissionError::NotProcessing { status, .. } = err else {
        panic!("expected NotProcessing, got {err}");
    };
    assert_eq!(status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn confirmation_after_conference_start_is_rejected() {
    let sys = system();
    let conference = sys
        .conference("Soon", 1, Duration::minutes(30), Duration::hours(4))
        .await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let promoted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    sys.engine.cancel_booking(holder.id).await.unwrap();

    sys.clock.advance(Duration::minutes(45));
    let err = sys.engine.confirm_waitlist_booking(promoted.id).await.unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyStarted { .. }));
}

#[tokio::test]
async fn fully_booked_override_blocks_confirmation_without_changing_state() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let promoted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    sys.engine.cancel_booking(holder.id).await.unwrap();

    sys.engine.set_fully_booked(conference.id, true).await.unwrap();
    let err = sys.engine.confirm_waitlist_booking(promoted.id).await.unwrap_err();
    assert!(matches!(err, AdmissionError::NoSeatsAvailable { .. }));
    assert_eq!(sys.status_of(promoted.id).await, BookingStatus::Processing);

    sys.engine.set_fully_booked(conference.id, false).await.unwrap();
    let confirmed = sys.engine.confirm_waitlist_booking(promoted.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
}

// ============================================================================
// Overlap withdrawal
// ============================================================================

#[tokio::test]
async fn confirmation_withdraws_overlapping_waitlists_and_spares_the_rest() {
    let sys = system();
    let target = sys
        .conference("Target", 1, Duration::hours(24), Duration::hours(3))
        .await;
    let clashing = sys
        .conference("Clashing", 1, Duration::hours(25), Duration::hours(3))
        .await;
    let disjoint = sys
        .conference("Disjoint", 1, Duration::hours(48), Duration::hours(3))
        .await;

    // Fill the two other conferences so the user lands on their waitlists.
    sys.engine
        .create_booking(UserId::new(), clashing.id)
        .await
        .unwrap();
    sys.engine
        .create_booking(UserId::new(), disjoint.id)
        .await
        .unwrap();

    let user = UserId::new();
    let on_clashing = sys.engine.create_booking(user, clashing.id).await.unwrap();
    let on_disjoint = sys.engine.create_booking(user, disjoint.id).await.unwrap();
    assert_eq!(on_clashing.status, BookingStatus::Waitlisted);
    assert_eq!(on_disjoint.status, BookingStatus::Waitlisted);

    // A free seat on the target conference confirms directly...
    let direct = sys.engine.create_booking(user, target.id).await.unwrap();
    assert_eq!(direct.status, BookingStatus::Confirmed);

    // ...withdrawing the user from the overlapping waitlist only.
    assert_eq!(sys.status_of(on_clashing.id).await, BookingStatus::Cancelled);
    assert_eq!(sys.queue_depth(clashing.id).await, 0);
    assert_eq!(sys.status_of(on_disjoint.id).await, BookingStatus::Waitlisted);
    assert_eq!(sys.queue_depth(disjoint.id).await, 1);
}

// ============================================================================
// Idempotent enqueue
// ============================================================================

#[tokio::test]
async fn retried_enqueue_of_the_same_transition_is_deduplicated() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    sys.engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let waitlisted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    // Replay the enqueue as a duplicate delivery would.
    let stored = sys.bookings.find_by_id(&waitlisted.id).await.unwrap().unwrap();
    let queue = sys
        .conferences
        .find_by_id(&conference.id)
        .await
        .unwrap()
        .unwrap()
        .waitlist_queue
        .unwrap();
    let outcome = sys
        .channel
        .enqueue(&queue, WaitlistEntry::for_booking(&stored))
        .await
        .unwrap();
    assert!(outcome.is_duplicate());
    assert_eq!(sys.channel.depth(&queue).await.unwrap(), 1);
}

// ============================================================================
// Started-conference sweep
// ============================================================================

#[tokio::test]
async fn started_conference_sweep_cancels_waitlist_and_purges_the_channel() {
    let sys = system();
    let conference = sys
        .conference("Soon", 1, Duration::hours(1), Duration::hours(4))
        .await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let first = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let second = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    sys.clock.advance(Duration::hours(2));
    let cancelled = sys.engine.sweep_started_conferences().await.unwrap();
    assert_eq!(cancelled, 2);

    assert_eq!(sys.status_of(first.id).await, BookingStatus::Cancelled);
    assert_eq!(sys.status_of(second.id).await, BookingStatus::Cancelled);
    // The confirmed attendee is untouched.
    assert_eq!(sys.status_of(holder.id).await, BookingStatus::Confirmed);

    let swept = sys.conferences.find_by_id(&conference.id).await.unwrap().unwrap();
    assert!(swept.waitlist_queue.is_none());

    // A second pass finds nothing to do.
    assert_eq!(sys.engine.sweep_started_conferences().await.unwrap(), 0);
}

// ============================================================================
// Fully-booked override
// ============================================================================

#[tokio::test]
async fn fully_booked_override_waitlists_despite_free_seats_and_clearing_promotes() {
    let sys = system();
    let conference = sys.tomorrow(2).await;

    sys.engine.set_fully_booked(conference.id, true).await.unwrap();
    let hopeful = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    assert_eq!(hopeful.status, BookingStatus::Waitlisted);
    assert_eq!(sys.available(conference.id).await, 2);

    sys.engine.set_fully_booked(conference.id, false).await.unwrap();

    // Clearing the flag promoted the waitlisted booking onto a held seat.
    assert_eq!(sys.status_of(hopeful.id).await, BookingStatus::Processing);
    assert_eq!(sys.available(conference.id).await, 1);
    assert_eq!(sys.queue_depth(conference.id).await, 0);
}

// ============================================================================
// Reconciliation sweep
// ============================================================================

#[tokio::test]
async fn reconciliation_restores_an_entry_lost_to_a_transient_enqueue_failure() {
    let sys = system();
    let conference = sys.tomorrow(1).await;
    let user = UserId::new();

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    sys.channel.fail_next_enqueues(1);
    let err = sys.engine.create_booking(user, conference.id).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Channel(_)));

    // The booking is waitlisted but its entry is missing.
    let orphan = sys.engine.bookings_for_user(user).await.unwrap().remove(0);
    assert_eq!(orphan.status, BookingStatus::Waitlisted);
    assert_eq!(sys.queue_depth(conference.id).await, 0);

    assert_eq!(sys.engine.sweep_missing_enqueues().await.unwrap(), 1);
    assert_eq!(sys.queue_depth(conference.id).await, 1);
    // A second pass is a no-op.
    assert_eq!(sys.engine.sweep_missing_enqueues().await.unwrap(), 0);

    // The restored entry is promotable.
    sys.engine.cancel_booking(holder.id).await.unwrap();
    assert_eq!(sys.status_of(orphan.id).await, BookingStatus::Processing);
}

// ============================================================================
// Status view
// ============================================================================

#[tokio::test]
async fn booking_status_view_exposes_the_confirmation_deadline() {
    let sys = system();
    let conference = sys.tomorrow(1).await;

    let holder = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();
    let waitlisted = sys
        .engine
        .create_booking(UserId::new(), conference.id)
        .await
        .unwrap();

    let view = sys.engine.booking_status(waitlisted.id).await.unwrap();
    assert_eq!(view.status, BookingStatus::Waitlisted);
    assert!(!view.can_confirm);
    assert!(view.confirm_until.is_none());

    sys.engine.cancel_booking(holder.id).await.unwrap();
    let promoted_at = sys.clock.now();

    let view = sys.engine.booking_status(waitlisted.id).await.unwrap();
    assert_eq!(view.status, BookingStatus::Processing);
    assert!(view.can_confirm);
    assert_eq!(view.confirm_until, Some(promoted_at + Duration::hours(1)));

    let err = sys.engine.booking_status(BookingId::new()).await.unwrap_err();
    assert!(matches!(err, AdmissionError::BookingNotFound(_)));
}

// ============================================================================
// Read helpers
// ============================================================================

#[tokio::test]
async fn read_helpers_list_bookings_in_creation_order() {
    let sys = system();
    let conference = sys.tomorrow(1).await;
    let user = UserId::new();
    let other_conference = sys
        .conference("Disjoint", 3, Duration::hours(72), Duration::hours(3))
        .await;

    let first = sys.engine.create_booking(user, conference.id).await.unwrap();
    sys.clock.advance(Duration::minutes(1));
    let second = sys
        .engine
        .create_booking(user, other_conference.id)
        .await
        .unwrap();

    let mine: Vec<Booking> = sys.engine.bookings_for_user(user).await.unwrap();
    assert_eq!(
        mine.iter().map(|b| b.id).collect::<Vec<_>>(),
        vec![first.id, second.id]
    );

    let confirmed = sys
        .engine
        .bookings_for_conference(conference.id, BookingStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(sys.engine.booking(first.id).await.unwrap().id, first.id);
}
