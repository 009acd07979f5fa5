//! Caller-visible error taxonomy.
//!
//! # Data Flow
//! ```text
//! transport error / non-2xx response / bad body / cancellation
//!     → Failure (raw shape, crate-internal vocabulary)
//!     → normalizer.rs (single translation point)
//!     → ApiError { kind, message, code, details }
//! ```
//!
//! # Design Decisions
//! - `ApiError` has no public constructor; only the normalizer builds one
//! - Callers match on `ErrorKind`, never on transport types

pub mod normalizer;

pub use normalizer::{ErrorNormalizer, Failure, InterceptorStage};

use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Machine code for local request-build failures (never retried).
pub const CODE_INVALID_REQUEST: &str = "invalid_request";

/// Machine code for interceptor rejections.
pub const CODE_INTERCEPTOR_REJECTED: &str = "interceptor_rejected";

/// Machine code for a failed token refresh.
pub const CODE_REFRESH_FAILED: &str = "refresh_failed";

/// Machine code for a 401 that survived a refresh-and-retry cycle.
pub const CODE_SESSION_EXPIRED: &str = "session_expired";

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response was received.
    Network,
    /// The request deadline elapsed.
    Timeout,
    /// The caller cancelled the request.
    Aborted,
    /// A well-formed non-2xx response.
    Http { status: u16 },
    /// The response body could not be decoded.
    Parse,
    /// The session could not be refreshed; callers should log out.
    Auth,
}

impl ErrorKind {
    /// HTTP status, if this is an `Http` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ErrorKind::Http { status } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Aborted => write!(f, "aborted"),
            ErrorKind::Http { status } => write!(f, "HTTP {}", status),
            ErrorKind::Parse => write!(f, "parse error"),
            ErrorKind::Auth => write!(f, "authentication error"),
        }
    }
}

/// Normalized error returned by every pipeline call.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    details: Option<Value>,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            details: None,
            retry_after: None,
        }
    }

    pub(crate) fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub(crate) fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub(crate) fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Server-requested delay from a `Retry-After` header.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// HTTP status for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        self.kind.status()
    }

    /// True when the caller should treat the session as gone.
    pub fn is_session_invalid(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}
