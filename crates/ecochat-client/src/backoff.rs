//! Jittered exponential backoff for reconnection.

use std::time::Duration;

use rand::Rng;

/// Default base delay before the first retry.
pub const DEFAULT_BASE: Duration = Duration::from_millis(500);

/// Default cap on the retry delay.
pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

/// Exponential backoff with equal jitter.
///
/// Each failure doubles the raw delay up to the cap; the returned delay is
/// drawn uniformly from `[raw / 2, raw]` so a fleet of clients does not
/// reconnect in lockstep. `reset` is called after a successful connection.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff with the given base and cap.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Number of consecutive failures so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget accumulated failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay to wait before the next attempt, advancing the failure count.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.cap);
        self.attempt = self.attempt.saturating_add(1);

        let half = u64::try_from(exp.as_millis()).unwrap_or(u64::MAX) / 2;
        let jitter = rand::rng().random_range(0..=half);
        Duration::from_millis(half + jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP)
    }
}
