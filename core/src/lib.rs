//! # Admission Core
//!
//! Domain types and collaborator traits for the conference admission system.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//!
//! - **Types**: conferences with slot accounting, bookings with their
//!   admission state machine, waitlist entries with idempotency keys and
//!   priority tiers ([`types`])
//! - **Overlap**: time-overlap computation used to withdraw a user from
//!   competing waitlists once seated ([`overlap`])
//! - **Collaborator traits**: record stores with optimistic concurrency
//!   ([`store`]), the per-conference waitlist channel ([`channel`]), and the
//!   injected clock ([`environment`])
//! - **Errors**: the admission error taxonomy ([`error`])
//!
//! The crate performs no I/O. Production implementations of the collaborator
//! traits live in `admission-postgres`; deterministic in-memory ones in
//! `admission-testing`; the orchestration lives in `admission-engine`.
//!
//! ## Lifecycle
//!
//! ```text
//! (none) --create--> Confirmed      [seat reserved]
//! (none) --create--> Waitlisted     [no seat; enqueued]
//! Waitlisted --promote--> Processing    [seat tentatively held]
//! Processing --confirm--> Confirmed     [within window]
//! Processing --expire---> Waitlisted    [window elapsed; re-enqueued]
//! Confirmed | Waitlisted | Processing --cancel--> Cancelled   [terminal]
//! ```

pub mod channel;
pub mod environment;
pub mod error;
pub mod overlap;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Duration, Utc};

pub use channel::{ChannelError, EnqueueOutcome, WaitlistChannel};
pub use environment::{Clock, SystemClock};
pub use error::AdmissionError;
pub use store::{BookingStore, ConferenceStore, StoreError};
pub use types::{
    Booking, BookingId, BookingStatus, BookingStatusView, Conference, ConferenceId,
    IdempotencyKey, Priority, QueueId, UserId, WaitlistEntry,
};
