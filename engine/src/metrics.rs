//! Metric names emitted by the admission engine.
//!
//! Counters are emitted through the `metrics` facade; wiring an exporter is
//! the host process's concern. Names are collected here so dashboards and
//! alerts have a single place to reference.

/// Bookings created, any initial state. Labeled implicitly by the outcome
/// counters below.
pub const BOOKINGS_CREATED: &str = "admission_bookings_created_total";

/// Bookings that ended up holding a seat (direct grant or confirmed off the
/// waitlist).
pub const BOOKINGS_CONFIRMED: &str = "admission_bookings_confirmed_total";

/// Bookings cancelled by the user.
pub const BOOKINGS_CANCELLED: &str = "admission_bookings_cancelled_total";

/// Entries appended to a waitlist queue (deduplicated attempts not counted).
pub const WAITLIST_ENQUEUED: &str = "admission_waitlist_enqueued_total";

/// Waitlist entries promoted to the processing state.
pub const WAITLIST_PROMOTIONS: &str = "admission_waitlist_promotions_total";

/// Waitlisted bookings withdrawn because the user confirmed an overlapping
/// conference.
pub const WAITLIST_WITHDRAWALS: &str = "admission_waitlist_withdrawals_total";

/// Processing bookings demoted back to the waitlist after the confirmation
/// window elapsed.
pub const PROCESSING_DEMOTIONS: &str = "admission_processing_demotions_total";

/// Bookings cancelled by the started-conference sweep.
pub const SWEEP_CANCELLATIONS: &str = "admission_sweep_cancellations_total";

/// Waitlist entries restored by the reconciliation sweep.
pub const SWEEP_REENQUEUES: &str = "admission_sweep_reenqueues_total";
