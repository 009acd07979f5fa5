//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the API client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every relative request path is resolved against.
    pub base_url: String,

    /// Headers added to every request unless the call overrides them.
    pub headers: BTreeMap<String, String>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Response cache configuration.
    pub cache: CacheConfig,

    /// Credential handling.
    pub auth: AuthConfig,

    /// Anti-forgery token handling.
    pub csrf: CsrfConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("X-Requested-With".to_string(), "XMLHttpRequest".to_string());

        Self {
            base_url: "http://localhost:3000/api".to_string(),
            headers,
            timeouts: TimeoutConfig::default(),
            retries: RetryConfig::default(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
            csrf: CsrfConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default deadline for a logical request in milliseconds.
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_ms: 30_000 }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries per call when the call does not say otherwise.
    pub default_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_retries: 0,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch; when off, `cache: true` on a call is ignored.
    pub enabled: bool,

    /// TTL used when neither the call nor `Cache-Control` provides one.
    pub default_ttl_secs: u64,

    /// After a successful mutation, drop cached reads under the same path.
    pub invalidate_on_mutation: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
            invalidate_on_mutation: true,
        }
    }
}

/// How credentials travel with requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// `Authorization: Bearer <token>` on every request.
    Header,
    /// HTTP-only cookies managed by the transport; no header.
    Cookie,
}

/// Credential handling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Refresh endpoint, relative to the base URL.
    pub refresh_path: String,

    /// Refresh proactively when the access token expires within this window.
    pub expiry_skew_secs: u64,

    /// Attempt a refresh-and-retry when a request gets 401.
    pub refresh_on_unauthorized: bool,

    /// Upper bound on one refresh call, in milliseconds.
    pub refresh_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Header,
            refresh_path: "/auth/refresh".to_string(),
            expiry_skew_secs: 30,
            refresh_on_unauthorized: true,
            refresh_timeout_ms: 10_000,
        }
    }
}

/// Anti-forgery token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,

    /// Header the token is sent in.
    pub header_name: String,

    /// Non-HTTP-only cookie holding the token, if any.
    pub cookie_name: Option<String>,

    /// Endpoint returning `{"csrfToken": "..."}`, relative to the base URL.
    pub token_path: Option<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "X-CSRF-Token".to_string(),
            cookie_name: Some("csrf_token".to_string()),
            token_path: Some("/auth/csrf-token".to_string()),
        }
    }
}

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeouts.request_ms, 30_000);
        assert_eq!(config.retries.default_retries, 0);
        assert_eq!(config.auth.mode, AuthMode::Header);
        assert_eq!(config.csrf.header_name, "X-CSRF-Token");
        assert_eq!(config.headers.get("X-Requested-With").map(String::as_str), Some("XMLHttpRequest"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            base_url = "https://dash.example.com/api"

            [retries]
            default_retries = 2

            [auth]
            mode = "cookie"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "https://dash.example.com/api");
        assert_eq!(config.retries.default_retries, 2);
        assert_eq!(config.retries.base_delay_ms, 1_000);
        assert_eq!(config.auth.mode, AuthMode::Cookie);
        assert_eq!(config.auth.refresh_path, "/auth/refresh");
        assert!(config.cache.enabled);
    }
}
