//! Retry policies for durable steps.
//!
//! The delay before attempt `n + 1` (after `n` failures) is:
//!
//! ```text
//! linear:      delay * n
//! exponential: delay * 2^(n-1)
//! ```
//!
//! capped at [`MAX_DELAY`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest wait between two attempts of one step.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Constant,
    Linear,
    Exponential,
}

/// How often and how patiently a step is attempted.
///
/// `retries` counts attempts *after* the first, so a policy with
/// `retries: 3` runs the step body at most four times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
    /// Each attempt is abandoned after this long and counted as failed.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_ms: 1000,
            backoff: Backoff::Linear,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to wait after `failures` failed attempts (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let base = Duration::from_millis(self.delay_ms);
        let n = failures.max(1);
        let delay = match self.backoff {
            Backoff::Constant => base,
            Backoff::Linear => base.saturating_mul(n),
            Backoff::Exponential => base.saturating_mul(1u32.checked_shl(n - 1).unwrap_or(u32::MAX)),
        };
        delay.min(MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(backoff: Backoff) -> RetryPolicy {
        RetryPolicy {
            retries: 3,
            delay_ms: 1000,
            backoff,
            timeout_ms: 5000,
        }
    }

    #[test]
    fn test_linear_backoff() {
        let p = policy(Backoff::Linear);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_backoff() {
        let p = policy(Backoff::Exponential);
        assert_eq!(p.delay_after(1), Duration::from_secs(1));
        assert_eq!(p.delay_after(2), Duration::from_secs(2));
        assert_eq!(p.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy(Backoff::Exponential);
        assert_eq!(p.delay_after(40), MAX_DELAY);
    }

    #[test]
    fn test_attempts_include_first_try() {
        assert_eq!(policy(Backoff::Constant).max_attempts(), 4);
    }
}
