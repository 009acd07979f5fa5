//! Configuration validation.
//!
//! Serde handles syntax; this module checks meaning. All problems are
//! collected so a broken file is reported in one pass.

use reqwest::header::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("base_url '{0}' is not an absolute http(s) URL")]
    InvalidBaseUrl(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("retries.max_delay_ms ({max}) is smaller than retries.base_delay_ms ({base})")]
    DelayCapBelowBase { base: u64, max: u64 },

    #[error("{field} '{value}' must start with '/'")]
    RelativePath { field: &'static str, value: String },

    #[error("invalid header '{0}'")]
    InvalidHeader(String),
}

/// Check a parsed configuration, returning every problem found.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match Url::parse(&config.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidBaseUrl(config.base_url.clone())),
    }

    if config.timeouts.request_ms == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_ms" });
    }

    if config.auth.refresh_timeout_ms == 0 {
        errors.push(ValidationError::Zero { field: "auth.refresh_timeout_ms" });
    }

    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::DelayCapBelowBase {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }

    if !config.auth.refresh_path.starts_with('/') {
        errors.push(ValidationError::RelativePath {
            field: "auth.refresh_path",
            value: config.auth.refresh_path.clone(),
        });
    }

    if let Some(path) = &config.csrf.token_path {
        if !path.starts_with('/') {
            errors.push(ValidationError::RelativePath {
                field: "csrf.token_path",
                value: path.clone(),
            });
        }
    }

    if HeaderName::from_bytes(config.csrf.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader(config.csrf.header_name.clone()));
    }

    for (name, value) in &config.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidHeader(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
