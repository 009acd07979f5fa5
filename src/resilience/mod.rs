//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → cancellation.rs (race dispatch against caller token + deadline)
//!     → On failure: retries.rs (classify, bound attempts, pick delay)
//!     → backoff.rs (exponential delay, capped)
//!     → cancellation.rs (cancellable backoff wait)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every logical request has a deadline
//! - Retry classification happens on normalized errors only
//! - Permanent failures surface immediately

pub mod backoff;
pub mod cancellation;
pub mod retries;

pub use cancellation::{CancelReason, CancellationController};
pub use retries::RetryPolicy;
