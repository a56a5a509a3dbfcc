//! Retry logic with exponential backoff and jitter.
//!
//! Only transient handler failures are retried. Permanent failures are
//! surfaced immediately.

use std::time::Duration;

use rand::Rng;

use crate::error::Error;

/// Default retry configuration.
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,
    /// Jitter factor to add randomness (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings.
    pub const fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set jitter factor.
    #[must_use]
    pub const fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Calculate delay for the given attempt number using exponential backoff with jitter.
    ///
    /// Delay formula: min(base_delay * 2^attempt, max_delay) + jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let exponential_delay = self.base_delay_ms.saturating_mul(factor);
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        // Add jitter to prevent thundering herd
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let jitter_ms = if self.jitter_factor > 0.0 && capped_delay > 0 {
            let jitter_range = (capped_delay as f64) * self.jitter_factor;
            rand::thread_rng().gen_range(0.0..jitter_range).floor() as u64
        } else {
            0
        };

        Duration::from_millis(capped_delay.saturating_add(jitter_ms))
    }

    /// Determine if an error should be retried.
    pub const fn should_retry(&self, error: &Error) -> bool {
        error.is_transient()
    }

    /// Create a retry state for tracking attempts.
    pub fn state(&self) -> RetryState {
        RetryState::new(self.clone())
    }
}

/// Retry state for tracking retry attempts.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Create a new retry state.
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Get current attempt number (0-indexed).
    pub const fn current_attempt(&self) -> u32 {
        self.attempt
    }

    /// Check if more retries are available.
    pub const fn can_retry(&self) -> bool {
        self.attempt < self.policy.max_retries
    }

    /// Record a retry attempt and get the delay before next retry.
    ///
    /// Returns None if no more retries are available.
    pub fn next_retry(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        let delay = self.policy.calculate_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }
}
