//! TTL-keyed response cache.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cache::key::CacheKey;
use crate::http::response::ApiResponse;
use crate::observability::metrics;

/// Longest lifetime an entry can get (2^31 seconds, the delta-seconds ceiling of RFC 9111).
pub const MAX_TTL: Duration = Duration::from_secs(crate::http::response::MAX_DELTA_SECONDS);

/// A stored response and its expiry.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub key: CacheKey,
    pub value: ApiResponse,
    pub expires_at: Instant,
}

impl CachedEntry {
    /// An entry is dead from `expires_at` onward.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-wide cache for idempotent reads.
///
/// Cloning shares the same underlying map.
#[derive(Clone, Default)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, CachedEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `key`; an expired entry is evicted and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<ApiResponse> {
        let now = Instant::now();
        if let Some(entry) = self.inner.get(key.as_str()) {
            if !entry.is_expired(now) {
                metrics::record_cache_lookup(true);
                return Some(entry.value.clone());
            }
        }

        // Guard from `get` is released above; removing while holding it would deadlock.
        if self
            .inner
            .remove_if(key.as_str(), |_, entry| entry.is_expired(now))
            .is_some()
        {
            tracing::debug!(key = %key, "Evicted expired cache entry");
        }
        metrics::record_cache_lookup(false);
        None
    }

    /// Store `value` for `ttl`, replacing any existing entry. A zero TTL stores nothing.
    ///
    /// TTLs longer than [`MAX_TTL`] are shortened to it.
    pub fn set(&self, key: CacheKey, value: ApiResponse, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let ttl = ttl.min(MAX_TTL);
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            tracing::debug!(key = %key, "Cache TTL out of range, not cached");
            return;
        };
        let entry = CachedEntry {
            key: key.clone(),
            value,
            expires_at,
        };
        self.inner.insert(key.as_str().to_string(), entry);
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached response");
    }

    /// Drop every entry whose path-and-query or full key matches the glob `pattern`.
    ///
    /// A pattern that is not a valid glob is treated as a literal prefix.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let matcher: Box<dyn Fn(&CachedEntry) -> bool> = match glob::Pattern::new(pattern) {
            Ok(glob) => Box::new(move |e: &CachedEntry| {
                glob.matches(e.key.path_and_query()) || glob.matches(e.key.as_str())
            }),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid cache pattern, using prefix match");
                let prefix = pattern.to_string();
                Box::new(move |entry: &CachedEntry| {
                    entry.key.path_and_query().starts_with(&prefix)
                        || entry.key.as_str().starts_with(&prefix)
                })
            }
        };

        let doomed: Vec<String> = self
            .inner
            .iter()
            .filter(|r| matcher(r.value()))
            .map(|r| r.key().clone())
            .collect();

        let removed = doomed
            .iter()
            .filter(|k| self.inner.remove(k.as_str()).is_some())
            .count();

        if removed > 0 {
            metrics::record_cache_invalidation(removed);
            tracing::debug!(pattern = %pattern, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Remove all expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            metrics::record_cache_invalidation(removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use serde_json::json;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(&Method::GET, &format!("http://api.test{}", path).parse().unwrap())
    }

    fn response(data: serde_json::Value) -> ApiResponse {
        ApiResponse {
            status: 200,
            headers: Default::default(),
            data,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_operations() {
        let cache = ResponseCache::new();
        let k = key("/contacts");

        assert!(cache.get(&k).is_none());

        cache.set(k.clone(), response(json!([1])), Duration::from_secs(10));
        assert_eq!(cache.get(&k).unwrap().data, json!([1]));

        // Overwrite
        cache.set(k.clone(), response(json!([2])), Duration::from_secs(10));
        assert_eq!(cache.get(&k).unwrap().data, json!([2]));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_evicted_on_access() {
        let cache = ResponseCache::new();
        let k = key("/tasks");
        cache.set(k.clone(), response(json!("t")), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get(&k).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&k).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_not_stored() {
        let cache = ResponseCache::new();
        cache.set(key("/x"), response(json!(1)), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ttl_is_capped() {
        let cache = ResponseCache::new();
        let k = key("/settings");
        cache.set(k.clone(), response(json!("s")), Duration::MAX);
        assert!(cache.get(&k).is_some());

        tokio::time::advance(MAX_TTL).await;
        assert!(cache.get(&k).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_pattern() {
        let cache = ResponseCache::new();
        cache.set(key("/contacts"), response(json!(1)), Duration::from_secs(60));
        cache.set(key("/contacts/7"), response(json!(2)), Duration::from_secs(60));
        cache.set(key("/contacts?page=2"), response(json!(3)), Duration::from_secs(60));
        cache.set(key("/tasks"), response(json!(4)), Duration::from_secs(60));

        assert_eq!(cache.invalidate("/contacts*"), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("/tasks")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_glob_falls_back_to_prefix() {
        let cache = ResponseCache::new();
        cache.set(key("/a[b"), response(json!(1)), Duration::from_secs(60));
        assert_eq!(cache.invalidate("/a["), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResponseCache::new();
        cache.set(key("/short"), response(json!(1)), Duration::from_secs(1));
        cache.set(key("/long"), response(json!(2)), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
