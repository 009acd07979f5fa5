//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! RequestConfig
//!     → merge defaults (headers, timeout, retries, retry delay)
//!     → request interceptors
//!     → cache lookup (GET + cache = true): hit returns here
//!     → loop under CancellationController:
//!         ensure_fresh → CSRF + bearer annotation → transport.send
//!         401 → AuthTokenManager (refresh once, replay)
//!         403 CSRF → CsrfGuard::refresh (replay once)
//!         other failure → RetryPolicy (backoff, replay) | terminal
//!     → decode → response interceptors → cache store / invalidate
//!     → serde into T
//! ```
//!
//! # Design Decisions
//! - Every caller-visible error comes from `ErrorNormalizer`
//! - The timeout covers the whole logical request
//! - Auth and CSRF replays do not consume the retry budget

pub mod client;

pub use client::RequestPipeline;
