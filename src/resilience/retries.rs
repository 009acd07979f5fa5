//! Retry decisions.
//!
//! # Responsibilities
//! - Classify a normalized error as transient or permanent
//! - Bound the number of attempts
//! - Compute the wait before the next attempt
//!
//! # Design Decisions
//! - 401 is never retried here; the auth manager owns that path
//! - Cancellation and timeouts are terminal even with retries left
//! - `Retry-After` wins over the computed backoff

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ApiError, ErrorKind, CODE_INVALID_REQUEST};
use crate::resilience::backoff::calculate_backoff;

/// Pure retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    cap: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(cap: Duration, jitter: bool) -> Self {
        Self { cap, jitter }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(Duration::from_millis(config.max_delay_ms), config.jitter)
    }

    /// Upper bound for computed delays.
    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// True for transient failures: no response, 429, or any 5xx.
    pub fn is_retryable(error: &ApiError) -> bool {
        match error.kind() {
            ErrorKind::Network => error.code() != Some(CODE_INVALID_REQUEST),
            ErrorKind::Http { status } => status == 429 || (500..600).contains(&status),
            ErrorKind::Timeout | ErrorKind::Aborted | ErrorKind::Parse | ErrorKind::Auth => false,
        }
    }

    /// `attempt_number` is the number of dispatches already made (1-based);
    /// `max_attempts` is `retries + 1`.
    pub fn should_retry(&self, error: &ApiError, attempt_number: u32, max_attempts: u32) -> bool {
        attempt_number < max_attempts && Self::is_retryable(error)
    }

    /// Wait before the `retry`-th retry (0-based).
    pub fn delay(&self, retry: u32, base: Duration, retry_after: Option<Duration>) -> Duration {
        if let Some(server_delay) = retry_after {
            return server_delay;
        }
        calculate_backoff(
            retry,
            saturating_millis(base),
            saturating_millis(self.cap),
            self.jitter,
        )
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorNormalizer, Failure};
    use crate::http::response::HttpResponse;
    use crate::http::transport::TransportError;
    use crate::resilience::cancellation::CancelReason;

    fn status(code: u16) -> ApiError {
        ErrorNormalizer::normalize(Failure::Status(HttpResponse::new(code)))
    }

    fn network() -> ApiError {
        ErrorNormalizer::normalize(Failure::Transport(TransportError::Connect("refused".into())))
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RetryPolicy::is_retryable(&network()));
        assert!(RetryPolicy::is_retryable(&status(429)));
        assert!(RetryPolicy::is_retryable(&status(500)));
        assert!(RetryPolicy::is_retryable(&status(503)));

        assert!(!RetryPolicy::is_retryable(&status(400)));
        assert!(!RetryPolicy::is_retryable(&status(401)));
        assert!(!RetryPolicy::is_retryable(&status(403)));
        assert!(!RetryPolicy::is_retryable(&status(404)));
    }

    #[test]
    fn test_cancellation_never_retried() {
        let aborted = ErrorNormalizer::normalize(Failure::Cancelled(CancelReason::Aborted));
        let timed_out = ErrorNormalizer::normalize(Failure::Cancelled(CancelReason::TimedOut(
            Duration::from_secs(1),
        )));
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&aborted, 1, 5));
        assert!(!policy.should_retry(&timed_out, 1, 5));
    }

    #[test]
    fn test_invalid_request_not_retried() {
        let err = ErrorNormalizer::normalize(Failure::Transport(TransportError::InvalidRequest("bad".into())));
        assert!(!RetryPolicy::is_retryable(&err));
    }

    #[test]
    fn test_attempt_bound() {
        let policy = RetryPolicy::default();
        // retries = 2 → max_attempts = 3
        assert!(policy.should_retry(&network(), 1, 3));
        assert!(policy.should_retry(&network(), 2, 3));
        assert!(!policy.should_retry(&network(), 3, 3));
        // retries = 0
        assert!(!policy.should_retry(&network(), 1, 1));
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::new(Duration::from_millis(1000), false);
        let base = Duration::from_millis(100);
        assert_eq!(policy.delay(0, base, None), Duration::from_millis(100));
        assert_eq!(policy.delay(1, base, None), Duration::from_millis(200));
        assert_eq!(policy.delay(3, base, None), Duration::from_millis(800));
        assert_eq!(policy.delay(4, base, None), Duration::from_millis(1000));
    }

    #[test]
    fn test_retry_after_takes_precedence() {
        let policy = RetryPolicy::new(Duration::from_millis(1000), false);
        let d = policy.delay(0, Duration::from_millis(100), Some(Duration::from_secs(5)));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn test_huge_base_delay_stays_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(1000), false);
        assert_eq!(policy.delay(0, Duration::MAX, None), Duration::from_millis(1000));
    }
}
