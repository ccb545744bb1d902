//! Business-rule validation for new bookings.
//!
//! Collects every violated rule into one reasons list so the caller sees the
//! full picture in a single round trip.
//!
//! Only *confirmed* bookings block a time-conflicting request: a user may
//! hedge by waitlisting on several overlapping conferences, and the first
//! confirmation withdraws them from the competing waitlists. A confirmed
//! seat, on the other hand, makes an overlapping booking unattendable.

use admission_core::error::AdmissionError;
use admission_core::overlap::overlaps;
use admission_core::types::{Booking, BookingStatus, Conference};
use std::collections::HashMap;

/// Validates booking requests against the user's existing bookings.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookingValidator;

impl BookingValidator {
    /// Creates a new `BookingValidator`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reject a new booking that conflicts in time with one of the user's
    /// confirmed bookings for another conference.
    ///
    /// The duplicate-booking and already-started rules are checked by the
    /// engine beforehand; this validator only owns the cross-conference
    /// conflict rules.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Validation`] with one reason per conflict.
    pub fn validate_no_conflicts(
        &self,
        target: &Conference,
        user_bookings: &[Booking],
        all_conferences: &[Conference],
    ) -> Result<(), AdmissionError> {
        let by_id: HashMap<_, _> = all_conferences.iter().map(|c| (c.id, c)).collect();

        let mut reasons = Vec::new();
        for booking in user_bookings {
            if booking.conference_id == target.id {
                continue;
            }
            if booking.status != BookingStatus::Confirmed {
                continue;
            }
            let Some(existing) = by_id.get(&booking.conference_id) else {
                continue;
            };
            if overlaps(target, existing) {
                reasons.push(format!(
                    "time conflict with confirmed booking {} for conference '{}'",
                    booking.id, existing.name
                ));
            }
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(AdmissionError::validation(reasons))
        }
    }
}
