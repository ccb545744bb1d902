//! Engine configuration.
//!
//! Loaded from environment variables with sensible defaults; every value can
//! also be set directly for tests.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

/// Tunables for the admission engine and its expiration scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Seconds a promoted booking has to confirm before falling back to the
    /// waitlist (default: 3600).
    pub confirmation_window_secs: i64,
    /// Seconds between expiration scheduler ticks (default: 60).
    pub sweep_interval_secs: u64,
    /// Attempts a slot-ledger update makes before giving up on version
    /// conflicts (default: 5).
    pub ledger_retry_attempts: u32,
}

impl AdmissionConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            confirmation_window_secs: env::var("CONFIRMATION_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            ledger_retry_attempts: env::var("LEDGER_RETRY_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }

    /// The confirmation window as a duration.
    #[must_use]
    pub fn confirmation_window(&self) -> Duration {
        Duration::seconds(self.confirmation_window_secs)
    }

    /// The sweep interval as a duration.
    #[must_use]
    pub const fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            confirmation_window_secs: 3600,
            sweep_interval_secs: 60,
            ledger_retry_attempts: 5,
        }
    }
}
