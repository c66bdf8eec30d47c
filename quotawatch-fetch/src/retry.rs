//! Retry policy for failed quota fetches.

use std::time::Duration;

/// Default number of retries after a failed fetch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before a retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry ladder with a fixed delay.
///
/// Retries are numbered from 1. After `max_retries` retries have failed the
/// caller gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Delay before every retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY)
    }
}
