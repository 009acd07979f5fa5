//! Resilient client layer for the dashboard API.
//!
//! Every call goes through one [`RequestPipeline`]: defaults and
//! interceptors, CSRF and bearer annotation, response caching, retries
//! with exponential backoff, single-flight session refresh on 401, and a
//! cancellation signal combining the caller's token with a deadline.
//! Failures come back as a normalized [`ApiError`].

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod pipeline;
pub mod resilience;

pub use auth::{AuthTokenManager, CsrfGuard, SessionEvent, TokenPair};
pub use cache::ResponseCache;
pub use config::ClientConfig;
pub use error::{ApiError, ErrorKind};
pub use http::{Body, RequestConfig};
pub use pipeline::RequestPipeline;
