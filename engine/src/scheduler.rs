//! Periodic expiration scheduler.
//!
//! An explicit background task — scheduled by the process's runtime, not
//! hidden inside the request path — that drives the engine's sweeps on a
//! fixed interval:
//!
//! 1. started-conference sweep (cancel waitlisted bookings, purge channels)
//! 2. expired-processing sweep (demote unconfirmed promotions)
//! 3. reconciliation sweep (restore missing waitlist entries)
//!
//! The confirmation window is enforced lazily: its effective granularity is
//! this scheduler's interval (plus the check on each confirmation call).
//!
//! # Shutdown
//!
//! The scheduler listens on a `broadcast` shutdown channel shared with the
//! rest of the process and exits between ticks. Sweep failures are logged and
//! never terminate the task.

use crate::engine::AdmissionEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Periodic task demoting expired promotions and voiding started
/// conferences' waitlists.
pub struct ExpirationScheduler {
    engine: Arc<AdmissionEngine>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ExpirationScheduler {
    /// Creates a scheduler driving `engine` every `interval`.
    #[must_use]
    pub const fn new(
        engine: Arc<AdmissionEngine>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            engine,
            interval,
            shutdown,
        }
    }

    /// Spawn the scheduler as a background task.
    ///
    /// The task runs until a shutdown signal is received. The returned handle
    /// can be awaited during graceful shutdown.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(interval = ?self.interval, "expiration scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of `interval` fires immediately; consume it so the
        // first sweep happens one interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("expiration scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
        info!("expiration scheduler stopped");
    }

    /// One full pass over all three sweeps. Failures are logged, never fatal.
    async fn sweep_once(&self) {
        match self.engine.sweep_started_conferences().await {
            Ok(cancelled) if cancelled > 0 => {
                info!(cancelled, "started-conference sweep cancelled waitlisted bookings");
            },
            Ok(_) => debug!("started-conference sweep: nothing to do"),
            Err(e) => error!(error = %e, "started-conference sweep failed"),
        }

        match self.engine.sweep_expired_processing().await {
            Ok(demoted) if demoted > 0 => {
                info!(demoted, "expiration sweep demoted processing bookings");
            },
            Ok(_) => debug!("expiration sweep: nothing to do"),
            Err(e) => error!(error = %e, "expiration sweep failed"),
        }

        match self.engine.sweep_missing_enqueues().await {
            Ok(restored) if restored > 0 => {
                info!(restored, "reconciliation sweep restored waitlist entries");
            },
            Ok(_) => debug!("reconciliation sweep: nothing to do"),
            Err(e) => error!(error = %e, "reconciliation sweep failed"),
        }
    }
}
