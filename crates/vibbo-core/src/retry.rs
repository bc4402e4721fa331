//! Bounded retry with exponential backoff for transient fetch failures.
//!
//! Retries happen within a single poll cycle only; the policy never blocks
//! subsequent scheduled cycles.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Retry policy: how many attempts, how long between them, and which error
/// kinds are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for one fetch (first try included).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt after that.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.base_delay_secs),
        )
    }

    /// Transient transport failures and rate limits are retryable; auth and
    /// payload problems are not (they won't get better by waiting 2 seconds).
    pub fn is_retryable(&self, error: &FetchError) -> bool {
        matches!(error, FetchError::Network(_) | FetchError::RateLimited)
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
