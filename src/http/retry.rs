//! Retry policies with exponential backoff for transient HTTP failures.
//!
//! A [`RetryPolicy`] answers two questions for the [`Transport`](super::Transport):
//! whether a response status counts as transient, and whether a failed attempt
//! should be repeated (and after how long).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sarfetch_core::http::{ExponentialBackoff, RetryDecision, RetryPolicy};
//!
//! let policy = ExponentialBackoff::default();
//! match policy.should_retry(1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_millis(500));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

/// Default maximum attempts, including the initial one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (500 milliseconds).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Status codes treated as transient unless a policy says otherwise.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Decision on whether to repeat a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up and surface the last outcome.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Pluggable retry strategy consulted by the transport after each attempt.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Returns true if a response with this status is a transient failure.
    fn is_retryable_status(&self, status: StatusCode) -> bool {
        DEFAULT_RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    /// Decides what to do after `attempt` (1-indexed) failed.
    fn should_retry(&self, attempt: u32) -> RetryDecision;
}

/// Exponential backoff: `delay = base * 2^(attempt - 1)`, bounded by an attempt count.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `base_delay`: 500ms
/// - retryable statuses: 429, 500, 502, 503, 504
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: u32,
    base_delay: Duration,
    retryable_statuses: Vec<u16>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl ExponentialBackoff {
    /// Creates a policy with custom attempt count and base delay.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Delay before the first retry
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self::new(max_attempts, DEFAULT_BASE_DELAY)
    }

    /// Replaces the set of statuses treated as transient.
    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Backoff for the retry that follows `attempt`, saturating on overflow.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_statuses.contains(&status.as_u16())
    }

    fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_for(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Opt-out policy: every attempt is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn should_retry(&self, _attempt: u32) -> RetryDecision {
        RetryDecision::DoNotRetry {
            reason: "retries disabled".to_string(),
        }
    }
}
