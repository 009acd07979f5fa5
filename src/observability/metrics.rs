//! Metrics collection.
//!
//! # Metrics
//! - `api_client_dispatches_total` (counter): transport dispatches by method
//! - `api_client_retries_total` (counter): policy retries by reason
//! - `api_client_cache_lookups_total` (counter): cache hits and misses
//! - `api_client_cache_invalidations_total` (counter): entries dropped
//! - `api_client_refresh_total` (counter): refresh starts, joins, outcomes
//! - `api_client_request_duration_seconds` (histogram): logical request latency
//!
//! Calls go through the `metrics` facade and cost nothing until the host
//! application installs a recorder.

use std::time::Instant;

/// One transport dispatch.
pub fn record_dispatch(method: &str) {
    metrics::counter!("api_client_dispatches_total", "method" => method.to_string()).increment(1);
}

/// One policy retry.
pub fn record_retry(reason: &'static str) {
    metrics::counter!("api_client_retries_total", "reason" => reason).increment(1);
}

/// One cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("api_client_cache_lookups_total", "result" => result).increment(1);
}

/// Entries removed by invalidation or expiry.
pub fn record_cache_invalidation(count: usize) {
    metrics::counter!("api_client_cache_invalidations_total").increment(count as u64);
}

/// Refresh lifecycle event: `started`, `joined`, `succeeded`, `failed`.
pub fn record_refresh(event: &'static str) {
    metrics::counter!("api_client_refresh_total", "event" => event).increment(1);
}

/// Completed logical request.
pub fn record_request(method: &str, outcome: &str, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    metrics::histogram!(
        "api_client_request_duration_seconds",
        "method" => method.to_string(),
        "outcome" => outcome.to_string()
    )
    .record(elapsed);
}
