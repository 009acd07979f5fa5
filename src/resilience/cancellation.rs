//! Caller cancellation combined with an internal deadline.
//!
//! # Responsibilities
//! - Race any suspension point (dispatch, backoff, refresh wait) against
//!   the caller's token and the request deadline
//! - Report which of the two fired
//!
//! # Design Decisions
//! - The deadline covers the whole logical request, not one attempt
//! - Caller cancellation wins when both are ready
//! - Cancellation only flows downward; siblings are unaffected

use std::future::{pending, Future};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Why a request stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's token was cancelled.
    Aborted,
    /// The internal deadline elapsed.
    TimedOut(Duration),
}

/// Combined cancellation signal for one logical request.
#[derive(Debug, Clone)]
pub struct CancellationController {
    caller: Option<CancellationToken>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl CancellationController {
    /// Starts the deadline clock immediately. A timeout too large to
    /// place on the clock means no deadline.
    pub fn new(caller: Option<CancellationToken>, timeout: Option<Duration>) -> Self {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        Self {
            caller,
            timeout: deadline.and(timeout),
            deadline,
        }
    }

    /// Non-blocking check of both signals.
    pub fn check(&self) -> Result<(), CancelReason> {
        if self.caller.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(CancelReason::Aborted);
        }
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                Err(CancelReason::TimedOut(timeout))
            }
            _ => Ok(()),
        }
    }

    /// Resolves when either signal fires.
    pub async fn fired(&self) -> CancelReason {
        let caller = async {
            match &self.caller {
                Some(token) => token.cancelled().await,
                None => pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = caller => CancelReason::Aborted,
            _ = deadline => CancelReason::TimedOut(self.timeout.unwrap_or_default()),
        }
    }

    /// Drive `fut` unless a signal fires first; `fut` is dropped on cancellation.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.fired() => Err(reason),
            out = fut => Ok(out),
        }
    }

    /// Cancellable sleep used for backoff waits.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CancelReason> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires() {
        let ctl = CancellationController::new(None, Some(Duration::from_millis(100)));
        let result = ctl.run(tokio::time::sleep(Duration::from_secs(10))).await;
        assert_eq!(result, Err(CancelReason::TimedOut(Duration::from_millis(100))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let ctl = CancellationController::new(None, Some(Duration::MAX));
        assert_eq!(ctl.check(), Ok(()));
        let result = ctl.run(tokio::time::sleep(Duration::from_secs(3600))).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancel_fires() {
        let token = CancellationToken::new();
        let ctl = CancellationController::new(Some(token.clone()), Some(Duration::from_secs(60)));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result = ctl.sleep(Duration::from_secs(30)).await;
        assert_eq!(result, Err(CancelReason::Aborted));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_without_signals() {
        let ctl = CancellationController::new(None, None);
        assert_eq!(ctl.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn test_check_reports_precancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctl = CancellationController::new(Some(token), Some(Duration::from_secs(1)));
        assert_eq!(ctl.check(), Err(CancelReason::Aborted));
        assert_eq!(ctl.run(async { 1 }).await, Err(CancelReason::Aborted));
    }
}
