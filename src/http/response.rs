//! Response representation and header interpretation.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::http::request::{header_value, insert_header, Headers};

/// Ceiling for delta-seconds cache lifetimes (RFC 9111 section 1.2.2).
pub const MAX_DELTA_SECONDS: u64 = 1 << 31;

/// Raw response as returned by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// JSON response with the matching content type.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Canonical reason phrase for the status code.
    pub fn reason(&self) -> &'static str {
        StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
    }

    /// Delay requested by a `Retry-After` header (delta-seconds or HTTP-date).
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.header("retry-after")?.trim();
        if let Ok(secs) = raw.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
        let wait = at.signed_duration_since(Utc::now());
        Some(wait.to_std().unwrap_or(Duration::ZERO))
    }

    /// `max-age` directive of `Cache-Control`, if any. Values past
    /// [`MAX_DELTA_SECONDS`] are read as that ceiling.
    pub fn cache_max_age(&self) -> Option<Duration> {
        let cc = self.header("cache-control")?;
        cc.split(',')
            .filter_map(|d| d.trim().strip_prefix("max-age="))
            .find_map(|v| parse_delta_seconds(v.trim_matches('"')))
            .map(Duration::from_secs)
    }

    /// True if `Cache-Control` forbids storing this response.
    pub fn is_no_store(&self) -> bool {
        self.header("cache-control")
            .map(|cc| {
                cc.split(',')
                    .any(|d| d.trim().eq_ignore_ascii_case("no-store"))
            })
            .unwrap_or(false)
    }

    fn is_json_content(&self) -> bool {
        match self.header("content-type") {
            Some(ct) => {
                let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                mime == "application/json" || mime.ends_with("+json")
            }
            None => matches!(self.body.first(), Some(b'{') | Some(b'[')),
        }
    }

    /// Decode the body: empty → `null`, JSON → parsed, anything else → string.
    pub fn decode(&self) -> Result<Value, serde_json::Error> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        if self.is_json_content() {
            return serde_json::from_slice(&self.body);
        }
        Ok(Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Non-negative delta-seconds, saturating at [`MAX_DELTA_SECONDS`].
fn parse_delta_seconds(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(raw.parse::<u64>().unwrap_or(u64::MAX).min(MAX_DELTA_SECONDS))
}

/// Successful, decoded response handed to response interceptors.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Headers,
    pub data: Value,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_after_seconds() {
        let resp = HttpResponse::new(429).with_header("Retry-After", "3");
        assert_eq!(resp.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_retry_after_past_date_is_zero() {
        let resp = HttpResponse::new(503).with_header("Retry-After", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(resp.retry_after(), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_after_garbage_ignored() {
        let resp = HttpResponse::new(503).with_header("Retry-After", "soon");
        assert_eq!(resp.retry_after(), None);
    }

    #[test]
    fn test_cache_control_parsing() {
        let resp = HttpResponse::new(200).with_header("Cache-Control", "public, max-age=60");
        assert_eq!(resp.cache_max_age(), Some(Duration::from_secs(60)));
        assert!(!resp.is_no_store());

        let resp = HttpResponse::new(200).with_header("Cache-Control", "No-Store");
        assert!(resp.is_no_store());
        assert_eq!(resp.cache_max_age(), None);
    }

    #[test]
    fn test_oversized_max_age_is_capped() {
        for raw in ["18446744073709551615", "99999999999999999999999"] {
            let resp = HttpResponse::new(200).with_header("Cache-Control", format!("max-age={}", raw));
            assert_eq!(resp.cache_max_age(), Some(Duration::from_secs(MAX_DELTA_SECONDS)));
        }

        let resp = HttpResponse::new(200).with_header("Cache-Control", "max-age=-5");
        assert_eq!(resp.cache_max_age(), None);
    }

    #[test]
    fn test_huge_retry_after_is_kept() {
        let resp = HttpResponse::new(503).with_header("Retry-After", "18446744073709551615");
        assert_eq!(resp.retry_after(), Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(HttpResponse::new(204).decode().unwrap(), Value::Null);

        let resp = HttpResponse::json(200, &json!({"data": "success"}));
        assert_eq!(resp.decode().unwrap(), json!({"data": "success"}));

        let resp = HttpResponse::new(200)
            .with_header("content-type", "text/plain")
            .with_body("pong");
        assert_eq!(resp.decode().unwrap(), json!("pong"));

        let resp = HttpResponse::new(200)
            .with_header("content-type", "application/problem+json")
            .with_body("{broken");
        assert!(resp.decode().is_err());
    }
}
