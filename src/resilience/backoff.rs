//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before the `retry`-th retry (0-based): `base * 2^retry`, capped at `max_ms`.
///
/// Jitter adds up to 10% before the cap is applied, which keeps the
/// schedule non-decreasing and bounded by `max_ms`.
pub fn calculate_backoff(retry: u32, base_ms: u64, max_ms: u64, jitter: bool) -> Duration {
    let exponential_base = 2u64.saturating_pow(retry);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    let jitter_ms = if jitter {
        let jitter_range = delay_ms / 10;
        if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        }
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter_ms).min(max_ms))
}
