//! # Admission Engine
//!
//! Orchestration for the conference admission system: the booking lifecycle,
//! seat accounting, waitlist promotion and the periodic expiration sweeps.
//!
//! ## Components
//!
//! - [`SlotLedger`](ledger::SlotLedger): linearizable per-conference seat
//!   accounting via optimistic-version retries
//! - [`BookingValidator`](validator::BookingValidator): cross-conference
//!   time-conflict rules, reported as a reasons list
//! - [`AdmissionEngine`](engine::AdmissionEngine): create / cancel / confirm /
//!   status, overlap-aware waitlist withdrawal, fully-booked override, sweeps
//! - [`ExpirationScheduler`](scheduler::ExpirationScheduler): the periodic
//!   task driving the sweeps
//! - [`AdmissionConfig`](config::AdmissionConfig): confirmation window, sweep
//!   interval and retry tunables
//!
//! ## Example
//!
//! ```ignore
//! use admission_engine::{AdmissionConfig, AdmissionEngine, ExpirationScheduler};
//! use std::sync::Arc;
//!
//! let config = AdmissionConfig::from_env();
//! let engine = Arc::new(AdmissionEngine::new(
//!     bookings, conferences, channel, clock, config.clone(),
//! ));
//!
//! let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
//! let scheduler = ExpirationScheduler::new(engine.clone(), config.sweep_interval(), shutdown_rx);
//! let handle = scheduler.spawn();
//!
//! let booking = engine.create_booking(user_id, conference_id).await?;
//! ```

pub mod config;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod scheduler;
pub mod validator;

// Re-export commonly used items
pub use config::AdmissionConfig;
pub use engine::AdmissionEngine;
pub use ledger::SlotLedger;
pub use scheduler::ExpirationScheduler;
pub use validator::BookingValidator;
