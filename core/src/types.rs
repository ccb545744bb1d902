//! Domain types for the conference admission system.
//!
//! This module contains the identifiers, entities and value objects shared by
//! every layer: conferences with slot accounting, bookings with their
//! admission state machine, and the waitlist entry that travels on the
//! per-conference channel.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a conference
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConferenceId(Uuid);

impl ConferenceId {
    /// Creates a new random `ConferenceId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ConferenceId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConferenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a per-conference waitlist queue.
///
/// Queues are created lazily the first time a booking overflows a conference,
/// and the identifier is stored on the conference record so later operations
/// can address the same queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(String);

impl QueueId {
    /// The canonical queue identifier for a conference's waitlist.
    #[must_use]
    pub fn for_conference(conference_id: &ConferenceId) -> Self {
        Self(format!("conference.waitlist.{conference_id}"))
    }

    /// Wrap an already-formatted queue identifier (e.g. loaded from storage).
    #[must_use]
    pub const fn from_string(raw: String) -> Self {
        Self(raw)
    }

    /// The queue identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Waitlist entries
// ============================================================================

/// Priority tier of a waitlist entry.
///
/// Entries are served strictly by tier (`Requeued` before `Normal`) and FIFO
/// within a tier. `Requeued` is reserved for entries the system took out of
/// their rightful place — an entry popped for promotion whose seat was sniped
/// by a concurrent direct booking goes back at `Requeued` so it stays ahead of
/// brand-new arrivals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Normal FIFO tier for first-time enqueues and expiry demotions.
    Normal,
    /// Re-insertion tier for entries returned to the queue after a failed
    /// ownership check.
    Requeued,
}

impl Priority {
    /// Numeric rank used for ordering and storage (higher is served first).
    #[must_use]
    pub const fn rank(self) -> i16 {
        match self {
            Self::Normal => 0,
            Self::Requeued => 1,
        }
    }

    /// Parse a stored numeric rank.
    #[must_use]
    pub const fn from_rank(rank: i16) -> Self {
        if rank >= 1 { Self::Requeued } else { Self::Normal }
    }
}

/// Deterministic key preventing duplicate waitlist enqueues for the same
/// logical event.
///
/// Derived from the booking id and the booking's last transition time, so a
/// retried enqueue of the same transition deduplicates while a later,
/// legitimate re-enqueue (after a demotion refreshed the transition time)
/// produces a fresh key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for a booking at its current transition time.
    #[must_use]
    pub fn for_booking(booking_id: &BookingId, transition_at: DateTime<Utc>) -> Self {
        Self(format!("{booking_id}:{}", transition_at.timestamp_millis()))
    }

    /// Wrap an already-formatted key (e.g. loaded from storage).
    #[must_use]
    pub const fn from_string(raw: String) -> Self {
        Self(raw)
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message carried on a conference's waitlist channel.
///
/// The channel is the sole authority on waitlist *order*; the booking record
/// is the sole authority on the booking's *state*. An entry referencing a
/// booking that is no longer `Waitlisted` is stale and dropped on dequeue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// The waitlisted booking this entry refers to.
    pub booking_id: BookingId,
    /// When the entry was (first) enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Dedup key for at-least-once enqueue attempts.
    pub idempotency_key: IdempotencyKey,
    /// Priority tier.
    pub priority: Priority,
}

impl WaitlistEntry {
    /// Build the entry for a booking's current waitlist membership.
    #[must_use]
    pub fn for_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            enqueued_at: booking.last_transition_at,
            idempotency_key: IdempotencyKey::for_booking(&booking.id, booking.last_transition_at),
            priority: Priority::Normal,
        }
    }

    /// The same entry at the `Requeued` tier.
    #[must_use]
    pub fn requeued(mut self) -> Self {
        self.priority = Priority::Requeued;
        self
    }
}

// ============================================================================
// Booking state machine
// ============================================================================

/// Admission state of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Holds a seat.
    Confirmed,
    /// Queued for a seat on the conference's waitlist channel.
    Waitlisted,
    /// Promoted off the waitlist; a seat is tentatively held while the user
    /// confirms within the confirmation window.
    Processing,
    /// Terminal. Cancelled bookings are never deleted and never transition.
    Cancelled,
}

impl BookingStatus {
    /// Whether the booking still counts against the one-active-booking-per-
    /// conference rule.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Transition legality table for the admission lifecycle.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Cancelled => false,
            Self::Waitlisted => matches!(next, Self::Processing | Self::Cancelled),
            Self::Processing => {
                matches!(next, Self::Confirmed | Self::Waitlisted | Self::Cancelled)
            },
            Self::Confirmed => matches!(next, Self::Cancelled),
        }
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Waitlisted => "waitlisted",
            Self::Processing => "processing",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns the unrecognised input when it names no known status.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "waitlisted" => Ok(Self::Waitlisted),
            "processing" => Ok(Self::Processing),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted an illegal booking state transition.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("illegal booking transition: {from} -> {to}")]
pub struct TransitionError {
    /// State the booking was in.
    pub from: BookingStatus,
    /// State the transition targeted.
    pub to: BookingStatus,
}

/// A user's admission record for one conference.
///
/// Created `Confirmed` or `Waitlisted`, mutated only through [`Booking::transition`],
/// and never deleted — cancellation is the terminal state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier.
    pub id: BookingId,
    /// The user holding the booking.
    pub user_id: UserId,
    /// The conference the booking is for.
    pub conference_id: ConferenceId,
    /// When the booking was created.
    pub created_at: DateTime<Utc>,
    /// When the booking last changed state. While `Processing` this is the
    /// start of the confirmation window.
    pub last_transition_at: DateTime<Utc>,
    /// Current admission state.
    pub status: BookingStatus,
    /// Optimistic-concurrency version, maintained by the booking store.
    pub version: u64,
}

impl Booking {
    /// Creates a new booking in its initial state.
    #[must_use]
    pub fn new(
        user_id: UserId,
        conference_id: ConferenceId,
        status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::new(),
            user_id,
            conference_id,
            created_at: now,
            last_transition_at: now,
            status,
            version: 0,
        }
    }

    /// Apply a state transition, refreshing the transition timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the lifecycle does not permit moving
    /// from the current state to `next` (notably: `Cancelled` is terminal).
    pub fn transition(&mut self, next: BookingStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.last_transition_at = now;
        Ok(())
    }

    /// End of the confirmation window while `Processing`, otherwise `None`.
    #[must_use]
    pub fn confirm_until(&self, window: Duration) -> Option<DateTime<Utc>> {
        matches!(self.status, BookingStatus::Processing).then(|| self.last_transition_at + window)
    }

    /// Whether a `Processing` booking's confirmation window has elapsed.
    #[must_use]
    pub fn confirmation_expired(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.confirm_until(window).is_some_and(|until| now > until)
    }
}

/// Read-side view of a booking's admission state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingStatusView {
    /// Current admission state.
    pub status: BookingStatus,
    /// Whether `confirm_waitlist_booking` can currently succeed.
    pub can_confirm: bool,
    /// Deadline for confirmation, set only while `Processing`.
    pub confirm_until: Option<DateTime<Utc>>,
}

// ============================================================================
// Conferences
// ============================================================================

/// A capacity-limited conference.
///
/// Slot fields are mutated only through the slot ledger, which maintains
/// `0 <= available_slots <= total_slots` on every write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conference {
    /// Unique conference identifier.
    pub id: ConferenceId,
    /// Conference name.
    pub name: String,
    /// Venue or city.
    pub location: String,
    /// When the conference starts; bookings close at this instant.
    pub start_time: DateTime<Utc>,
    /// When the conference ends; used for overlap computation.
    pub end_time: DateTime<Utc>,
    /// Total admission capacity.
    pub total_slots: u32,
    /// Currently unreserved capacity.
    pub available_slots: u32,
    /// Waitlist queue, created lazily on first overflow.
    pub waitlist_queue: Option<QueueId>,
    /// Manual override: blocks new seat grants regardless of `available_slots`.
    pub fully_booked: bool,
    /// Free-form topic tags.
    pub topics: Vec<String>,
    /// Optimistic-concurrency version, maintained by the conference store.
    pub version: u64,
    /// When the conference record was created.
    pub created_at: DateTime<Utc>,
}

impl Conference {
    /// Creates a new conference with all seats available.
    #[must_use]
    pub fn new(
        name: String,
        location: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        total_slots: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConferenceId::new(),
            name,
            location,
            start_time,
            end_time,
            total_slots,
            available_slots: total_slots,
            waitlist_queue: None,
            fully_booked: false,
            topics: Vec::new(),
            version: 0,
            created_at: now,
        }
    }

    /// Whether the conference has already started at `now`.
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now > self.start_time
    }

    /// Whether at least one seat is unreserved.
    #[must_use]
    pub const fn has_free_slot(&self) -> bool {
        self.available_slots > 0
    }
}
