//! Cache key normalization.

use reqwest::Method;
use std::fmt;
use url::Url;

/// Method + normalized URL + sorted query string.
///
/// Two requests that differ only in query parameter order, a trailing
/// slash or a fragment map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    path_and_query: String,
}

impl CacheKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        pairs.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&pairs)
            .finish();

        let mut normalized = url.clone();
        normalized.set_fragment(None);
        let path = normalized.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            normalized.set_path(path.trim_end_matches('/'));
        }
        normalized.set_query(if query.is_empty() { None } else { Some(&query) });

        let path_and_query = match normalized.query() {
            Some(q) => format!("{}?{}", normalized.path(), q),
            None => normalized.path().to_string(),
        };

        Self {
            key: format!("{} {}", method.as_str(), normalized),
            path_and_query,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Path plus sorted query, used for pattern invalidation.
    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
