//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! GET with cache = true
//!     → key.rs (method + normalized URL + sorted query)
//!     → store.rs lookup: hit → return without dispatch
//!                        miss/expired → dispatch, then store with TTL
//!
//! Successful mutation
//!     → store.rs invalidate(pattern)
//! ```
//!
//! # Design Decisions
//! - TTL priority: per-call TTL, then `Cache-Control: max-age`, then default
//! - Expired entries are removed lazily on lookup
//! - Only GET participates; mutations never read or write entries

pub mod key;
pub mod store;

pub use key::CacheKey;
pub use store::{CachedEntry, ResponseCache, MAX_TTL};
