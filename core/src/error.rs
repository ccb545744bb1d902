//! Error taxonomy for admission operations.
//!
//! The split follows how callers must react:
//!
//! - **Validation / NotFound / Duplicate / AlreadyStarted / AlreadyCancelled /
//!   NotProcessing** — the request was wrong; no state changed.
//! - **ConfirmationExpired** — a timing precondition was lost; the error is
//!   reported *and* a compensating state change has already been persisted
//!   (the booking is back on the waitlist), so the system is never left
//!   inconsistent even though the call failed.
//! - **NoSeatsAvailable** — a seat could not be granted; no state changed.
//! - **Store / Channel** — a collaborator failed; transient failures may be
//!   retried by the caller or repaired by the next sweep. These are surfaced,
//!   never swallowed, and never leave the slot ledger over- or under-counted.

use crate::channel::ChannelError;
use crate::store::StoreError;
use crate::types::{BookingId, BookingStatus, ConferenceId, TransitionError};
use thiserror::Error;

/// Errors returned by the admission engine's public operations.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// One or more business rules rejected the request. No state changed.
    #[error("booking validation failed: {}", reasons.join("; "))]
    Validation {
        /// Every rule that rejected the request.
        reasons: Vec<String>,
    },

    /// The referenced booking does not exist.
    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),

    /// The referenced conference does not exist.
    #[error("conference not found: {0}")]
    ConferenceNotFound(ConferenceId),

    /// The conference has already started; bookings and confirmations are
    /// closed.
    #[error("conference {conference_id} has already started")]
    AlreadyStarted {
        /// The conference whose start time has passed.
        conference_id: ConferenceId,
    },

    /// The user already holds a non-cancelled booking for this conference.
    #[error("user already has an active booking {existing} for this conference")]
    DuplicateBooking {
        /// The existing active booking.
        existing: BookingId,
    },

    /// The booking is already cancelled; cancellation is terminal.
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(BookingId),

    /// Confirmation requires the booking to be in the processing state.
    #[error("booking {booking_id} is not awaiting confirmation (status: {status})")]
    NotProcessing {
        /// The booking that was not in the processing state.
        booking_id: BookingId,
        /// The state it was actually in.
        status: BookingStatus,
    },

    /// The confirmation window elapsed. The booking has already been demoted
    /// back to the waitlist and re-enqueued; callers should re-poll
    /// `booking_status` rather than retry the confirmation.
    #[error("confirmation window for booking {booking_id} has expired; booking returned to waitlist")]
    ConfirmationExpired {
        /// The booking whose window elapsed.
        booking_id: BookingId,
    },

    /// No seat could be granted.
    #[error("no seats available for conference {conference_id}")]
    NoSeatsAvailable {
        /// The conference without free seats.
        conference_id: ConferenceId,
    },

    /// The booking lifecycle does not permit the requested transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A record store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A waitlist channel operation failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl AdmissionError {
    /// Build a validation error from a list of reasons.
    #[must_use]
    pub const fn validation(reasons: Vec<String>) -> Self {
        Self::Validation { reasons }
    }
}
