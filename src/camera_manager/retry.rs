//! Retry policy for camera hardware call failures
//!
//! The policy table is isolated here as an explicit state machine
//! (`RetrySchedule`) driven by the connection manager's single timer, so
//! it can be tested without any I/O.
//!
//! | kind          | delay                         | max attempts |
//! |---------------|-------------------------------|--------------|
//! | network       | min(1000 * 2^n, 30000) ms     | unlimited    |
//! | hardware      | 5000 ms linear                | 3            |
//! | configuration | -                             | 0            |
//! | api           | 2000 ms linear                | 5            |
//! | unknown       | 3000 ms linear                | 3            |

use crate::error::ErrorKind;
use std::time::Duration;

const NETWORK_BASE_MS: u64 = 1_000;
const NETWORK_CAP_MS: u64 = 30_000;
const HARDWARE_DELAY_MS: u64 = 5_000;
const HARDWARE_MAX_ATTEMPTS: u32 = 3;
const API_DELAY_MS: u64 = 2_000;
const API_MAX_ATTEMPTS: u32 = 5;
const UNKNOWN_DELAY_MS: u64 = 3_000;
const UNKNOWN_MAX_ATTEMPTS: u32 = 3;

/// Delay before the n-th retry (0-based) for the given error kind, or
/// `None` when the policy says stop retrying.
pub fn delay_for(kind: ErrorKind, attempt: u32) -> Option<Duration> {
    match kind {
        ErrorKind::Network => {
            // Cap the exponent before shifting; beyond 2^5 the cap wins anyway
            let factor = 1u64 << attempt.min(16);
            let ms = NETWORK_BASE_MS.saturating_mul(factor).min(NETWORK_CAP_MS);
            Some(Duration::from_millis(ms))
        }
        ErrorKind::Hardware => {
            (attempt < HARDWARE_MAX_ATTEMPTS).then(|| Duration::from_millis(HARDWARE_DELAY_MS))
        }
        ErrorKind::Configuration => None,
        ErrorKind::Api => (attempt < API_MAX_ATTEMPTS).then(|| Duration::from_millis(API_DELAY_MS)),
        // Data errors are not produced by hardware calls; treat like unknown
        ErrorKind::Data | ErrorKind::Unknown => {
            (attempt < UNKNOWN_MAX_ATTEMPTS).then(|| Duration::from_millis(UNKNOWN_DELAY_MS))
        }
    }
}

/// Per-session retry state. Attempts restart from zero when the error
/// kind changes or after a successful frame.
#[derive(Debug, Default)]
pub struct RetrySchedule {
    kind: Option<ErrorKind>,
    attempts: u32,
}

impl RetrySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; returns the delay before the next attempt, or
    /// `None` when retries for this kind are exhausted.
    pub fn on_failure(&mut self, kind: ErrorKind) -> Option<Duration> {
        if self.kind != Some(kind) {
            self.kind = Some(kind);
            self.attempts = 0;
        }
        let delay = delay_for(kind, self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// A successful frame resets the schedule
    pub fn on_success(&mut self) {
        self.kind = None;
        self.attempts = 0;
    }

    /// Consecutive failures of the current kind
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
