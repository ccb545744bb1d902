//! The admission engine: booking creation, cancellation, waitlist promotion,
//! confirmation and the periodic sweeps.
//!
//! # Seat accounting model
//!
//! A `Processing` booking *holds* its seat: promotion performs release +
//! immediate re-reserve under the per-conference promotion lock, so a
//! cancellation that promotes leaves `available_slots` unchanged.
//! Confirmation makes the held seat permanent without touching the ledger;
//! demotion (sweep or expired confirmation) and cancellation of a
//! `Processing` booking give the seat back.
//!
//! # Concurrency
//!
//! Per-conference slot mutations are linearized by the slot ledger's
//! optimistic version check. Release-and-promote is additionally serialized
//! by a per-conference async mutex so that one freed seat can never promote
//! two waitlist entries. Direct bookings deliberately do *not* take that
//! lock: a create racing a promotion may snipe the freed seat, in which case
//! the popped entry fails its ownership check and is re-enqueued at the
//! `Requeued` tier, ahead of brand-new arrivals.

use crate::config::AdmissionConfig;
use crate::ledger::SlotLedger;
use crate::metrics as metric_names;
use crate::validator::BookingValidator;
use admission_core::channel::WaitlistChannel;
use admission_core::environment::Clock;
use admission_core::error::AdmissionError;
use admission_core::overlap::overlapping;
use admission_core::store::{BookingStore, ConferenceStore, StoreError};
use admission_core::types::{
    Booking, BookingId, BookingStatus, BookingStatusView, Conference, ConferenceId, QueueId,
    UserId, WaitlistEntry,
};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

/// Attempts for small read-modify-write loops on conference metadata (queue
/// reference, fully-booked flag) before a version conflict is reported.
const METADATA_SAVE_ATTEMPTS: u32 = 3;

/// Orchestrates bookings against the slot ledger, the waitlist channel and
/// the record stores.
pub struct AdmissionEngine {
    bookings: Arc<dyn BookingStore>,
    conferences: Arc<dyn ConferenceStore>,
    channel: Arc<dyn WaitlistChannel>,
    clock: Arc<dyn Clock>,
    ledger: SlotLedger,
    validator: BookingValidator,
    config: AdmissionConfig,
    promotion_locks: Mutex<HashMap<ConferenceId, Arc<AsyncMutex<()>>>>,
}

impl AdmissionEngine {
    /// Creates an engine over the given collaborators.
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        conferences: Arc<dyn ConferenceStore>,
        channel: Arc<dyn WaitlistChannel>,
        clock: Arc<dyn Clock>,
        config: AdmissionConfig,
    ) -> Self {
        let ledger = SlotLedger::new(conferences.clone(), config.ledger_retry_attempts);
        Self {
            bookings,
            conferences,
            channel,
            clock,
            ledger,
            validator: BookingValidator::new(),
            config,
            promotion_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Create a booking for `user_id` on `conference_id`.
    ///
    /// Grants a seat (`Confirmed`) when one is free and the conference is not
    /// manually marked fully booked; otherwise the booking is `Waitlisted`
    /// and enqueued on the conference's waitlist channel (created lazily). A
    /// direct grant withdraws the user from every overlapping conference's
    /// waitlist.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::ConferenceNotFound`]
    /// - [`AdmissionError::AlreadyStarted`] once the conference has begun
    /// - [`AdmissionError::DuplicateBooking`] if the user already holds a
    ///   non-cancelled booking for this conference
    /// - [`AdmissionError::Validation`] on a time conflict with the user's
    ///   confirmed/waitlisted bookings
    /// - [`AdmissionError::Channel`] if the waitlist enqueue failed; the
    ///   booking stays `Waitlisted` and the reconciliation sweep re-enqueues
    ///   it
    pub async fn create_booking(
        &self,
        user_id: UserId,
        conference_id: ConferenceId,
    ) -> Result<Booking, AdmissionError> {
        let now = self.clock.now();
        let conference = self.require_conference(&conference_id).await?;

        if conference.has_started(now) {
            return Err(AdmissionError::AlreadyStarted { conference_id });
        }

        let user_bookings = self.bookings.find_by_user(&user_id).await?;
        if let Some(existing) = user_bookings
            .iter()
            .find(|b| b.conference_id == conference_id && b.status.is_active())
        {
            return Err(AdmissionError::DuplicateBooking {
                existing: existing.id,
            });
        }

        let all_conferences = self.conferences.find_all().await?;
        self.validator
            .validate_no_conflicts(&conference, &user_bookings, &all_conferences)?;

        let seat_granted = !conference.fully_booked && self.ledger.reserve(&conference_id).await?;
        counter!(metric_names::BOOKINGS_CREATED).increment(1);

        if seat_granted {
            let booking = Booking::new(user_id, conference_id, BookingStatus::Confirmed, now);
            let saved = match self.bookings.save(booking).await {
                Ok(saved) => saved,
                Err(e) => {
                    // The seat was taken but the record never landed; give it
                    // back so the ledger stays balanced.
                    if let Err(release_err) = self.ledger.release(&conference_id).await {
                        error!(%conference_id, error = %release_err, "failed to release seat after save failure");
                    }
                    return Err(e.into());
                },
            };
            counter!(metric_names::BOOKINGS_CONFIRMED).increment(1);
            info!(booking_id = %saved.id, %user_id, %conference_id, "booking confirmed");
            self.withdraw_from_overlapping_waitlists(&saved, &conference, &all_conferences)
                .await;
            Ok(saved)
        } else {
            let booking = Booking::new(user_id, conference_id, BookingStatus::Waitlisted, now);
            let saved = self.bookings.save(booking).await?;
            info!(booking_id = %saved.id, %user_id, %conference_id, "no free slots, booking waitlisted");

            let queue = self.ensure_queue(conference).await?;
            let entry = WaitlistEntry::for_booking(&saved);
            let outcome = self.channel.enqueue(&queue, entry).await?;
            if outcome.is_duplicate() {
                debug!(booking_id = %saved.id, "waitlist enqueue deduplicated");
            } else {
                counter!(metric_names::WAITLIST_ENQUEUED).increment(1);
            }
            Ok(saved)
        }
    }

    /// Cancel a booking. Cancellation is terminal and idempotency-checked:
    /// cancelling twice is an error.
    ///
    /// Cancelling a `Confirmed` booking releases its seat and promotes the
    /// head of the waitlist (if any) to `Processing` with a fresh
    /// confirmation window; the release and promotion happen as one step
    /// relative to other cancellations on the same conference. Cancelling a
    /// `Waitlisted` booking removes its channel entry; cancelling a
    /// `Processing` booking returns its tentatively held seat without
    /// promoting.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::BookingNotFound`]
    /// - [`AdmissionError::AlreadyCancelled`]
    pub async fn cancel_booking(&self, booking_id: BookingId) -> Result<(), AdmissionError> {
        let booking = self.require_booking(&booking_id).await?;
        let lock = self.promotion_lock(&booking.conference_id);
        let _guard = lock.lock().await;

        // Re-read under the lock: a sweep may have transitioned it meanwhile.
        let mut booking = self.require_booking(&booking_id).await?;
        let conference = self.require_conference(&booking.conference_id).await?;
        let now = self.clock.now();

        match booking.status {
            BookingStatus::Cancelled => return Err(AdmissionError::AlreadyCancelled(booking_id)),
            BookingStatus::Confirmed => {
                self.ledger.release(&conference.id).await?;
                let promoted = self.promote_next(&conference).await?;
                debug!(%booking_id, promoted, "seat released on cancellation");
            },
            BookingStatus::Waitlisted => {
                if let Some(queue) = &conference.waitlist_queue {
                    let target = booking.id;
                    let predicate = move |entry: &WaitlistEntry| entry.booking_id == target;
                    let removed = self.channel.remove_where(queue, &predicate).await?;
                    debug!(%booking_id, removed = removed.len(), "waitlist entry removed on cancellation");
                }
            },
            BookingStatus::Processing => {
                // The tentative hold goes back to the pool; promotion waits
                // for the next cancellation or direct booking.
                self.ledger.release(&conference.id).await?;
            },
        }

        booking.transition(BookingStatus::Cancelled, now)?;
        self.bookings.save(booking).await?;
        counter!(metric_names::BOOKINGS_CANCELLED).increment(1);
        info!(%booking_id, conference_id = %conference.id, "booking cancelled");
        Ok(())
    }

    /// Confirm a `Processing` booking within its confirmation window.
    ///
    /// On success the tentatively held seat becomes permanent and the user is
    /// withdrawn from every overlapping conference's waitlist.
    ///
    /// If the window has elapsed the booking is demoted back to `Waitlisted`
    /// and re-enqueued, and the call fails with
    /// [`AdmissionError::ConfirmationExpired`]. **The demotion persists even
    /// though the call fails**; callers should re-poll
    /// [`booking_status`](Self::booking_status) rather than retry.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::BookingNotFound`] / [`AdmissionError::ConferenceNotFound`]
    /// - [`AdmissionError::AlreadyStarted`] once the conference has begun
    /// - [`AdmissionError::NotProcessing`] unless the booking is `Processing`
    /// - [`AdmissionError::ConfirmationExpired`] after the window (with the
    ///   demotion already persisted)
    /// - [`AdmissionError::NoSeatsAvailable`] while the conference is
    ///   manually marked fully booked
    pub async fn confirm_waitlist_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Booking, AdmissionError> {
        let booking = self.require_booking(&booking_id).await?;
        let lock = self.promotion_lock(&booking.conference_id);
        let _guard = lock.lock().await;

        let mut booking = self.require_booking(&booking_id).await?;
        let conference = self.require_conference(&booking.conference_id).await?;
        let now = self.clock.now();

        if conference.has_started(now) {
            return Err(AdmissionError::AlreadyStarted {
                conference_id: conference.id,
            });
        }
        if booking.status != BookingStatus::Processing {
            return Err(AdmissionError::NotProcessing {
                booking_id,
                status: booking.status,
            });
        }

        if booking.confirmation_expired(self.config.confirmation_window(), now) {
            self.demote_expired(booking, conference).await?;
            return Err(AdmissionError::ConfirmationExpired { booking_id });
        }

        if conference.fully_booked {
            // Manual override blocks seat grants; state is left untouched.
            return Err(AdmissionError::NoSeatsAvailable {
                conference_id: conference.id,
            });
        }

        booking.transition(BookingStatus::Confirmed, now)?;
        let confirmed = self.bookings.save(booking).await?;
        counter!(metric_names::BOOKINGS_CONFIRMED).increment(1);
        info!(%booking_id, conference_id = %conference.id, "waitlist booking confirmed");

        let all_conferences = self.conferences.find_all().await?;
        self.withdraw_from_overlapping_waitlists(&confirmed, &conference, &all_conferences)
            .await;
        Ok(confirmed)
    }

    /// Read-side view of a booking's admission state.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::BookingNotFound`] for unknown ids.
    pub async fn booking_status(
        &self,
        booking_id: BookingId,
    ) -> Result<BookingStatusView, AdmissionError> {
        let booking = self.require_booking(&booking_id).await?;
        Ok(BookingStatusView {
            status: booking.status,
            can_confirm: booking.status == BookingStatus::Processing,
            confirm_until: booking.confirm_until(self.config.confirmation_window()),
        })
    }

    /// Look up a booking by id.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::BookingNotFound`] for unknown ids.
    pub async fn booking(&self, booking_id: BookingId) -> Result<Booking, AdmissionError> {
        self.require_booking(&booking_id).await
    }

    /// All bookings a user ever made, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] on storage failure.
    pub async fn bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, AdmissionError> {
        Ok(self.bookings.find_by_user(&user_id).await?)
    }

    /// All bookings for a conference in the given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] on storage failure.
    pub async fn bookings_for_conference(
        &self,
        conference_id: ConferenceId,
        status: BookingStatus,
    ) -> Result<Vec<Booking>, AdmissionError> {
        Ok(self
            .bookings
            .find_by_conference_and_status(&conference_id, status)
            .await?)
    }

    /// Set or clear the manual fully-booked override.
    ///
    /// Clearing the flag promotes waitlisted entries to `Processing`, one per
    /// free seat, through the same promotion path a cancellation uses.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::ConferenceNotFound`] or a store/channel
    /// failure from the promotion path.
    pub async fn set_fully_booked(
        &self,
        conference_id: ConferenceId,
        fully_booked: bool,
    ) -> Result<(), AdmissionError> {
        let lock = self.promotion_lock(&conference_id);
        let _guard = lock.lock().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut conference = self.require_conference(&conference_id).await?;
            if conference.fully_booked == fully_booked {
                break;
            }
            conference.fully_booked = fully_booked;
            match self.conferences.save(conference).await {
                Ok(_) => break,
                Err(StoreError::VersionConflict { .. }) if attempt < METADATA_SAVE_ATTEMPTS => {},
                Err(e) => return Err(e.into()),
            }
        }
        info!(%conference_id, fully_booked, "fully-booked override updated");

        if !fully_booked {
            loop {
                let current = self.require_conference(&conference_id).await?;
                if !current.has_free_slot() || !self.promote_next(&current).await? {
                    break;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Sweeps (driven by the expiration scheduler, callable directly in tests)
    // ========================================================================

    /// Cancel every waitlisted booking of conferences that have started,
    /// purge their channels and clear the channel references.
    ///
    /// Safe to run concurrently with user-triggered transitions: a booking
    /// that changed state since it was listed is skipped silently. Returns
    /// how many bookings were cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] when the conference list itself
    /// cannot be read; per-conference failures are logged and skipped.
    pub async fn sweep_started_conferences(&self) -> Result<usize, AdmissionError> {
        let now = self.clock.now();
        let all = self.conferences.find_all().await?;
        let mut cancelled_total = 0;

        for conference in all {
            if !conference.has_started(now) || conference.waitlist_queue.is_none() {
                continue;
            }
            match self.sweep_one_started_conference(&conference.id).await {
                Ok(cancelled) => cancelled_total += cancelled,
                Err(e) => {
                    error!(conference_id = %conference.id, error = %e, "started-conference sweep failed");
                },
            }
        }
        Ok(cancelled_total)
    }

    /// Demote every `Processing` booking whose confirmation window elapsed
    /// back to `Waitlisted` and re-enqueue it. Returns how many bookings were
    /// demoted.
    ///
    /// A booking the user confirmed (or cancelled) a moment earlier is
    /// detected by the re-read under the conference lock and skipped
    /// silently.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] when the processing list itself
    /// cannot be read; per-booking failures are logged and skipped.
    pub async fn sweep_expired_processing(&self) -> Result<usize, AdmissionError> {
        let now = self.clock.now();
        let window = self.config.confirmation_window();
        let processing = self.bookings.find_by_status(BookingStatus::Processing).await?;
        let mut demoted = 0;

        for booking in processing {
            if !booking.confirmation_expired(window, now) {
                continue;
            }
            match self.demote_one_expired(booking.id, booking.conference_id).await {
                Ok(true) => demoted += 1,
                Ok(false) => {},
                Err(e) => {
                    error!(booking_id = %booking.id, error = %e, "expiration sweep failed for booking");
                },
            }
        }
        Ok(demoted)
    }

    /// Re-enqueue `Waitlisted` bookings whose channel entry went missing
    /// (e.g. a transient enqueue failure at creation time). Returns how many
    /// entries were restored.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] when the waitlisted list itself
    /// cannot be read; per-booking failures are logged and skipped.
    pub async fn sweep_missing_enqueues(&self) -> Result<usize, AdmissionError> {
        let now = self.clock.now();
        let waitlisted = self.bookings.find_by_status(BookingStatus::Waitlisted).await?;
        let mut restored = 0;

        for booking in waitlisted {
            match self.reenqueue_if_missing(&booking, now).await {
                Ok(true) => restored += 1,
                Ok(false) => {},
                Err(e) => {
                    error!(booking_id = %booking.id, error = %e, "reconciliation sweep failed for booking");
                },
            }
        }
        Ok(restored)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn require_booking(&self, id: &BookingId) -> Result<Booking, AdmissionError> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or(AdmissionError::BookingNotFound(*id))
    }

    async fn require_conference(&self, id: &ConferenceId) -> Result<Conference, AdmissionError> {
        self.conferences
            .find_by_id(id)
            .await?
            .ok_or(AdmissionError::ConferenceNotFound(*id))
    }

    /// Lock serializing release-and-promote (and every other booking
    /// transition) for one conference.
    fn promotion_lock(&self, conference_id: &ConferenceId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .promotion_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(*conference_id).or_default().clone()
    }

    /// Resolve the conference's queue id, creating and persisting the
    /// reference lazily on first overflow.
    async fn ensure_queue(&self, conference: Conference) -> Result<QueueId, AdmissionError> {
        if let Some(queue) = conference.waitlist_queue {
            return Ok(queue);
        }
        let conference_id = conference.id;
        let queue = QueueId::for_conference(&conference_id);

        let mut attempt = 0;
        let mut current = conference;
        loop {
            attempt += 1;
            current.waitlist_queue = Some(queue.clone());
            match self.conferences.save(current).await {
                Ok(_) => {
                    info!(%conference_id, queue = %queue, "waitlist queue created");
                    return Ok(queue);
                },
                Err(StoreError::VersionConflict { .. }) if attempt < METADATA_SAVE_ATTEMPTS => {
                    let fresh = self.require_conference(&conference_id).await?;
                    if let Some(existing) = fresh.waitlist_queue {
                        // Another writer created it first; use theirs.
                        return Ok(existing);
                    }
                    current = fresh;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Promote the head of the conference's waitlist to `Processing`.
    ///
    /// Pops entries until a live `Waitlisted` candidate is found (missing or
    /// stale references are dropped), claims a seat for it, and persists the
    /// transition with a fresh confirmation window. Returns whether a
    /// promotion happened.
    ///
    /// Must be called with the conference's promotion lock held.
    async fn promote_next(&self, conference: &Conference) -> Result<bool, AdmissionError> {
        let Some(queue) = conference.waitlist_queue.clone() else {
            return Ok(false);
        };

        loop {
            let Some(entry) = self.channel.dequeue_next(&queue).await? else {
                debug!(conference_id = %conference.id, "waitlist empty, nothing to promote");
                return Ok(false);
            };
            let Some(mut candidate) = self.bookings.find_by_id(&entry.booking_id).await? else {
                warn!(booking_id = %entry.booking_id, "dropping waitlist entry: booking record missing");
                continue;
            };
            if candidate.status != BookingStatus::Waitlisted {
                debug!(
                    booking_id = %candidate.id,
                    status = %candidate.status,
                    "dropping stale waitlist entry"
                );
                continue;
            }

            if !self.ledger.reserve(&conference.id).await? {
                // Ownership check failed: a concurrent direct booking took
                // the seat. The entry goes back ahead of new arrivals.
                self.channel.requeue(&queue, entry.requeued()).await?;
                debug!(
                    booking_id = %candidate.id,
                    conference_id = %conference.id,
                    "promotion lost the seat race, entry requeued"
                );
                return Ok(false);
            }

            let now = self.clock.now();
            candidate.transition(BookingStatus::Processing, now)?;
            match self.bookings.save(candidate).await {
                Ok(promoted) => {
                    counter!(metric_names::WAITLIST_PROMOTIONS).increment(1);
                    info!(
                        booking_id = %promoted.id,
                        conference_id = %conference.id,
                        confirm_until = %(now + self.config.confirmation_window()),
                        "waitlist booking promoted to processing"
                    );
                    return Ok(true);
                },
                Err(e) => {
                    // Give the seat back and keep the entry (at-least-once).
                    if let Err(release_err) = self.ledger.release(&conference.id).await {
                        error!(conference_id = %conference.id, error = %release_err, "failed to release seat after promotion failure");
                    }
                    let booking_id = entry.booking_id.clone();
                    if let Err(requeue_err) = self.channel.requeue(&queue, entry.requeued()).await {
                        error!(booking_id = %booking_id, error = %requeue_err, "failed to requeue entry after promotion failure");
                    }
                    return Err(e.into());
                },
            }
        }
    }

    /// Persist the demotion of an expired `Processing` booking: back to
    /// `Waitlisted`, seat released, re-enqueued at the normal tier.
    ///
    /// Must be called with the conference's promotion lock held.
    async fn demote_expired(
        &self,
        mut booking: Booking,
        conference: Conference,
    ) -> Result<(), AdmissionError> {
        let now = self.clock.now();
        booking.transition(BookingStatus::Waitlisted, now)?;
        let demoted = self.bookings.save(booking).await?;
        self.ledger.release(&conference.id).await?;

        let conference_id = conference.id;
        let queue = self.ensure_queue(conference).await?;
        let entry = WaitlistEntry::for_booking(&demoted);
        if let Err(e) = self.channel.enqueue(&queue, entry).await {
            // The booking is Waitlisted but absent from the queue; the
            // reconciliation sweep restores it.
            warn!(booking_id = %demoted.id, error = %e, "re-enqueue after demotion failed");
        }
        counter!(metric_names::PROCESSING_DEMOTIONS).increment(1);
        info!(booking_id = %demoted.id, %conference_id, "expired processing booking demoted to waitlist");
        Ok(())
    }

    /// Lock, re-check and demote one expired booking. Returns whether the
    /// demotion happened (false = lost the race, skipped silently).
    async fn demote_one_expired(
        &self,
        booking_id: BookingId,
        conference_id: ConferenceId,
    ) -> Result<bool, AdmissionError> {
        let lock = self.promotion_lock(&conference_id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let Some(booking) = self.bookings.find_by_id(&booking_id).await? else {
            return Ok(false);
        };
        if booking.status != BookingStatus::Processing
            || !booking.confirmation_expired(self.config.confirmation_window(), now)
        {
            // The user confirmed or cancelled a moment earlier.
            return Ok(false);
        }
        let conference = self.require_conference(&conference_id).await?;
        self.demote_expired(booking, conference).await?;
        Ok(true)
    }

    /// Cancel waitlisted bookings, purge the channel and clear the queue
    /// reference for one started conference. Returns cancelled count.
    async fn sweep_one_started_conference(
        &self,
        conference_id: &ConferenceId,
    ) -> Result<usize, AdmissionError> {
        let lock = self.promotion_lock(conference_id);
        let _guard = lock.lock().await;

        let fresh = self.require_conference(conference_id).await?;
        let Some(queue) = fresh.waitlist_queue.clone() else {
            return Ok(0);
        };
        let now = self.clock.now();

        let waitlisted = self
            .bookings
            .find_by_conference_and_status(conference_id, BookingStatus::Waitlisted)
            .await?;
        let mut cancelled = 0;
        for mut booking in waitlisted {
            match booking.transition(BookingStatus::Cancelled, now) {
                Ok(()) => {},
                Err(e) => {
                    debug!(booking_id = %booking.id, error = %e, "skipping booking during sweep");
                    continue;
                },
            }
            match self.bookings.save(booking).await {
                Ok(saved) => {
                    cancelled += 1;
                    counter!(metric_names::SWEEP_CANCELLATIONS).increment(1);
                    debug!(booking_id = %saved.id, "waitlisted booking cancelled by sweep");
                },
                Err(StoreError::VersionConflict { .. }) => {
                    // Someone transitioned it concurrently; their write wins.
                    debug!("sweep lost a write race, skipping booking");
                },
                Err(e) => return Err(e.into()),
            }
        }

        let purged = self.channel.purge(&queue).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut current = self.require_conference(conference_id).await?;
            if current.waitlist_queue.is_none() {
                break;
            }
            current.waitlist_queue = None;
            match self.conferences.save(current).await {
                Ok(_) => break,
                Err(StoreError::VersionConflict { .. }) if attempt < METADATA_SAVE_ATTEMPTS => {},
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            %conference_id,
            cancelled,
            purged,
            "started conference swept: waitlist void"
        );
        Ok(cancelled)
    }

    /// Restore one booking's waitlist entry if it went missing. Returns
    /// whether a restore happened.
    async fn reenqueue_if_missing(
        &self,
        booking: &Booking,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool, AdmissionError> {
        let Some(conference) = self.conferences.find_by_id(&booking.conference_id).await? else {
            return Ok(false);
        };
        if conference.has_started(now) {
            // The started-conference sweep owns this case.
            return Ok(false);
        }

        let lock = self.promotion_lock(&conference.id);
        let _guard = lock.lock().await;

        let Some(fresh) = self.bookings.find_by_id(&booking.id).await? else {
            return Ok(false);
        };
        if fresh.status != BookingStatus::Waitlisted {
            return Ok(false);
        }

        let queue = self.ensure_queue(conference).await?;
        let entry = WaitlistEntry::for_booking(&fresh);
        if self.channel.contains(&queue, &entry.idempotency_key).await? {
            return Ok(false);
        }

        // The original enqueue may have burned its idempotency marker before
        // failing, so restore through the log-bypassing path; the check above
        // runs under the promotion lock, which keeps this single-shot.
        self.channel.requeue(&queue, entry).await?;
        counter!(metric_names::SWEEP_REENQUEUES).increment(1);
        info!(booking_id = %fresh.id, conference_id = %fresh.conference_id, "missing waitlist entry restored");
        Ok(true)
    }

    /// Withdraw the user from every overlapping conference's waitlist after a
    /// confirmation.
    ///
    /// Failures here never fail the confirmation that triggered the
    /// withdrawal: a spot left on a competing waitlist costs fairness, not
    /// consistency. Errors are logged per conference.
    async fn withdraw_from_overlapping_waitlists(
        &self,
        confirmed: &Booking,
        target: &Conference,
        all_conferences: &[Conference],
    ) {
        for other in overlapping(target, all_conferences) {
            if other.waitlist_queue.is_none() {
                continue;
            }
            if let Err(e) = self.withdraw_user_from_waitlist(confirmed.user_id, other).await {
                warn!(
                    user_id = %confirmed.user_id,
                    conference_id = %other.id,
                    error = %e,
                    "failed to withdraw user from overlapping waitlist"
                );
            }
        }
    }

    /// Pull one user's waitlisted bookings out of one conference's waitlist
    /// and cancel them.
    async fn withdraw_user_from_waitlist(
        &self,
        user_id: UserId,
        conference: &Conference,
    ) -> Result<(), AdmissionError> {
        let Some(queue) = &conference.waitlist_queue else {
            return Ok(());
        };
        let waitlisted = self
            .bookings
            .find_by_conference_and_status(&conference.id, BookingStatus::Waitlisted)
            .await?;
        let mine: HashSet<BookingId> = waitlisted
            .iter()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.id)
            .collect();
        if mine.is_empty() {
            return Ok(());
        }

        let ids = mine.clone();
        let predicate = move |entry: &WaitlistEntry| ids.contains(&entry.booking_id);
        let removed = self.channel.remove_where(queue, &predicate).await?;
        debug!(
            %user_id,
            conference_id = %conference.id,
            removed = removed.len(),
            "user withdrawn from overlapping waitlist"
        );

        let now = self.clock.now();
        for booking_id in mine {
            let Some(mut booking) = self.bookings.find_by_id(&booking_id).await? else {
                continue;
            };
            if booking.status != BookingStatus::Waitlisted {
                continue;
            }
            if booking.transition(BookingStatus::Cancelled, now).is_err() {
                continue;
            }
            match self.bookings.save(booking).await {
                Ok(_) => {
                    counter!(metric_names::WAITLIST_WITHDRAWALS).increment(1);
                    info!(%booking_id, conference_id = %conference.id, "overlapping waitlist booking cancelled");
                },
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(%booking_id, "withdrawal lost a write race, skipping");
                },
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
