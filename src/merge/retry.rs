//! Retry policy and error classification - pure functions
//!
//! No I/O happens here. The executor asks two questions of this module:
//! is this failure worth another attempt, and how long to wait before it.

use crate::error::Error;
use std::time::Duration;

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed if tried again later
    Transient,
    /// Retrying cannot help; fail the request now
    Blocked,
}

/// Function that classifies attempt errors
///
/// The executor takes this as a parameter so tests can force either class.
pub type Classifier = fn(&Error) -> ErrorClass;

/// Bounded exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Time budget for one attempt
    pub attempt_timeout: Duration,
    /// How long a request may wait for CI before it fails
    pub ci_wait: Duration,
    /// Pause between readiness checks while CI is running
    pub ci_poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            attempt_timeout: Duration::from_secs(60),
            ci_wait: Duration::from_secs(30 * 60),
            ci_poll_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Attempts allowed, never less than one
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Default classification of merge attempt errors
///
/// Transient: timeouts, connection failures, 5xx, 429 and rate-limited 403
/// responses. Everything else, including 405/409/422 merge refusals and
/// responses GitHub sent that could not be decoded, is blocked.
#[must_use]
pub fn classify(error: &Error) -> ErrorClass {
    match error {
        Error::Transient(_) | Error::Timeout(_) => ErrorClass::Transient,
        Error::Octocrab(octocrab::Error::GitHub { source, .. }) => {
            classify_status(source.status_code.as_u16(), &source.message)
        }
        // The request never got an answer from GitHub
        Error::Octocrab(octocrab::Error::Hyper { .. } | octocrab::Error::Service { .. }) => {
            ErrorClass::Transient
        }
        Error::Octocrab(_) => ErrorClass::Blocked,
        Error::Http(e) => {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                ErrorClass::Transient
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16(), "")
            } else {
                ErrorClass::Blocked
            }
        }
        _ => ErrorClass::Blocked,
    }
}

/// Classify an HTTP status returned by the GitHub API
#[must_use]
pub fn classify_status(status: u16, message: &str) -> ErrorClass {
    match status {
        429 | 500..=599 => ErrorClass::Transient,
        403 if message.to_ascii_lowercase().contains("rate limit") => ErrorClass::Transient,
        _ => ErrorClass::Blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            attempt_timeout: Duration::from_secs(1),
            ci_wait: Duration::from_secs(10),
            ci_poll_interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let p = policy(100, 10_000);
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(400));
        assert_eq!(p.delay_after(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let p = policy(2_000, 60_000);
        assert_eq!(p.delay_after(5), Duration::from_secs(32));
        assert_eq!(p.delay_after(6), Duration::from_secs(60));
        assert_eq!(p.delay_after(40), Duration::from_secs(60));
        assert_eq!(p.delay_after(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_attempts_never_zero() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.attempts(), 1);
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(500, ""), ErrorClass::Transient);
        assert_eq!(classify_status(502, "Bad Gateway"), ErrorClass::Transient);
        assert_eq!(classify_status(429, ""), ErrorClass::Transient);
        assert_eq!(
            classify_status(403, "API rate limit exceeded for user"),
            ErrorClass::Transient
        );
        assert_eq!(classify_status(403, "Resource not accessible"), ErrorClass::Blocked);
        assert_eq!(classify_status(405, "Pull Request is not mergeable"), ErrorClass::Blocked);
        assert_eq!(classify_status(409, "Head branch was modified"), ErrorClass::Blocked);
        assert_eq!(classify_status(422, ""), ErrorClass::Blocked);
    }

    #[test]
    fn test_classify_errors() {
        assert_eq!(
            classify(&Error::Transient("CI pending".into())),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&Error::Timeout(Duration::from_secs(60))),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(&Error::MergeBlocked("merge conflicts".into())),
            ErrorClass::Blocked
        );
        assert_eq!(
            classify(&Error::GitHubApi("unexpected response".into())),
            ErrorClass::Blocked
        );
    }
}
