//! Injected dependencies shared by every layer.
//!
//! All external effects the admission core depends on are abstracted behind
//! traits and injected, so business logic stays deterministic and testable.
//! Time is the only ambient dependency the core itself needs.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Every time comparison in the admission engine (conference start checks,
/// confirmation windows, sweep deadlines) goes through an injected `Clock`,
/// so tests can pin or advance time deterministically.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
