//! # Admission Testing
//!
//! Deterministic in-memory collaborators for testing the admission system.
//!
//! This crate provides:
//! - In-memory record stores with production version-conflict semantics
//! - An in-memory waitlist channel with production ordering/dedup semantics
//!   and scriptable enqueue failures
//! - A controllable [`FixedClock`]
//!
//! ## Example
//!
//! ```ignore
//! use admission_testing::{test_clock, InMemoryBookingStore, InMemoryConferenceStore,
//!     InMemoryWaitlistChannel};
//!
//! #[tokio::test]
//! async fn last_seat_goes_to_one_booking() {
//!     let clock = test_clock();
//!     let engine = AdmissionEngine::builder()
//!         .bookings(Arc::new(InMemoryBookingStore::new()))
//!         .conferences(Arc::new(InMemoryConferenceStore::new()))
//!         .channel(Arc::new(InMemoryWaitlistChannel::new()))
//!         .clock(Arc::new(clock.clone()))
//!         .build();
//!     // drive the engine, advance the clock, assert outcomes
//! }
//! ```

pub mod channel;
pub mod clock;
pub mod stores;

// Re-export commonly used items
pub use channel::InMemoryWaitlistChannel;
pub use clock::{FixedClock, test_clock};
pub use stores::{InMemoryBookingStore, InMemoryConferenceStore};

/// Initialize a compact tracing subscriber for tests.
///
/// Safe to call from every test; only the first call installs the subscriber.
/// Honors `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}
