//! Per-call request description.
//!
//! A `RequestConfig` is built by the caller, merged with client defaults,
//! passed through the request interceptors and then frozen. Every attempt
//! of a logical request is built from the same frozen config.

use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Header map keyed by lower-cased header name.
pub type Headers = BTreeMap<String, String>;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header identifying XHR-style requests.
pub const X_REQUESTED_WITH: &str = "x-requested-with";

/// Insert a header, normalizing the name to lower case.
pub fn insert_header(headers: &mut Headers, name: &str, value: impl Into<String>) {
    headers.insert(name.to_ascii_lowercase(), value.into());
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers.get(&name.to_ascii_lowercase()).map(String::as_str)
}

/// True for POST/PUT/PATCH/DELETE.
pub fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Resolve `target` against `base` and append `params` in name order.
///
/// Absolute URLs pass through untouched. Relative paths are joined with
/// exactly one `/`, so the base URL's own path is kept.
pub fn resolve_url(
    base: &str,
    target: &str,
    params: &BTreeMap<String, QueryValue>,
) -> Result<Url, url::ParseError> {
    let mut url = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target)?
    } else {
        Url::parse(&format!(
            "{}/{}",
            base.trim_end_matches('/'),
            target.trim_start_matches('/')
        ))?
    };

    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            query.append_pair(name, &value.to_string());
        }
    }
    Ok(url)
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(Value),
    /// URL-encoded form; content type is left to the transport.
    Form(Vec<(String, String)>),
    /// Opaque bytes with an explicit content type (e.g. multipart).
    Raw { bytes: Vec<u8>, content_type: String },
}

impl Body {
    pub fn is_json(&self) -> bool {
        matches!(self, Body::Json(_))
    }
}

/// Scalar query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Str(s) => write!(f, "{}", s),
            QueryValue::Int(i) => write!(f, "{}", i),
            QueryValue::Float(x) => write!(f, "{}", x),
            QueryValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        QueryValue::Str(s.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(s: String) -> Self {
        QueryValue::Str(s)
    }
}

impl From<i64> for QueryValue {
    fn from(i: i64) -> Self {
        QueryValue::Int(i)
    }
}

impl From<i32> for QueryValue {
    fn from(i: i32) -> Self {
        QueryValue::Int(i as i64)
    }
}

impl From<u32> for QueryValue {
    fn from(i: u32) -> Self {
        QueryValue::Int(i as i64)
    }
}

impl From<f64> for QueryValue {
    fn from(x: f64) -> Self {
        QueryValue::Float(x)
    }
}

impl From<bool> for QueryValue {
    fn from(b: bool) -> Self {
        QueryValue::Bool(b)
    }
}

/// Description of one logical API call.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL.
    pub url: String,
    pub headers: Headers,
    pub body: Option<Body>,
    /// Query parameters; sorted by name when serialized.
    pub params: BTreeMap<String, QueryValue>,
    /// Extra attempts after the first. `None` uses the client default.
    pub retries: Option<u32>,
    /// Base backoff delay. `None` uses the client default.
    pub retry_delay: Option<Duration>,
    /// Participate in the response cache (GET only).
    pub cache: bool,
    /// Explicit cache TTL, overriding `Cache-Control` and the default.
    pub cache_ttl: Option<Duration>,
    /// Deadline for the whole logical request.
    pub timeout: Option<Duration>,
    /// Caller-controlled cancellation.
    pub signal: Option<CancellationToken>,
    /// Cache key patterns to invalidate after a successful mutation.
    pub invalidates: Vec<String>,
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            params: BTreeMap::new(),
            retries: None,
            retry_delay: None,
            cache: false,
            cache_ttl: None,
            timeout: None,
            signal: None,
            invalidates: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Some(Body::Json(value));
        self
    }

    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = Some(Body::Form(pairs));
        self
    }

    pub fn raw(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(Body::Raw {
            bytes,
            content_type: content_type.into(),
        });
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = true;
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    pub fn invalidates(mut self, pattern: impl Into<String>) -> Self {
        self.invalidates.push(pattern.into());
        self
    }

    pub fn is_state_changing(&self) -> bool {
        is_state_changing(&self.method)
    }

    /// True when this call may read from or write to the response cache.
    pub fn is_cacheable(&self) -> bool {
        self.cache && self.method == Method::GET
    }
}
