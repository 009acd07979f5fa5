//! Credential types and the token store.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

/// Access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// True if the access token expires within `skew` from now. Unknown expiry never does.
    ///
    /// A skew reaching past the representable range covers every expiry.
    pub fn expires_within(&self, skew: Duration) -> bool {
        let Some(at) = self.expires_at else {
            return false;
        };
        match ChronoDuration::from_std(skew)
            .ok()
            .and_then(|skew| Utc::now().checked_add_signed(skew))
        {
            Some(horizon) => at <= horizon,
            None => true,
        }
    }
}

/// Body of a refresh endpoint response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    #[serde(alias = "access_token", alias = "token")]
    access_token: Option<String>,
    #[serde(alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(alias = "expires_in")]
    expires_in: Option<i64>,
    #[serde(alias = "expires_at")]
    expires_at: Option<DateTime<Utc>>,
}

/// Why a refresh response body could not be turned into tokens.
#[derive(Debug, Error)]
pub(crate) enum RefreshBodyError {
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid expiresIn: {0}")]
    ExpiresIn(i64),
}

/// Extract a token pair from a refresh response body.
///
/// Accepts the pair at the top level or under `data`. A missing refresh
/// token keeps `previous_refresh`. Returns `Ok(None)` when the body holds
/// no access token at all (cookie sessions).
pub(crate) fn parse_refresh_body(
    body: Value,
    previous_refresh: Option<String>,
) -> Result<Option<TokenPair>, RefreshBodyError> {
    let body = match body {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        Value::Null | Value::String(_) => return Ok(None),
        other => other,
    };

    let parsed: RefreshBody = serde_json::from_value(body)?;
    let Some(access_token) = parsed.access_token else {
        return Ok(None);
    };

    let expires_at = match (parsed.expires_at, parsed.expires_in) {
        (Some(at), _) => Some(at),
        (None, Some(secs)) => Some(expiry_from_now(secs)?),
        (None, None) => None,
    };

    Ok(Some(TokenPair {
        access_token,
        refresh_token: parsed.refresh_token.or(previous_refresh),
        expires_at,
    }))
}

fn expiry_from_now(secs: i64) -> Result<DateTime<Utc>, RefreshBodyError> {
    ChronoDuration::try_seconds(secs)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or(RefreshBodyError::ExpiresIn(secs))
}

/// Current credentials. Only the auth manager touches this.
#[derive(Debug, Default)]
pub(crate) struct TokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl TokenStore {
    pub(crate) fn get(&self) -> Option<TokenPair> {
        self.tokens.read().expect("token store poisoned").clone()
    }

    pub(crate) fn set(&self, pair: TokenPair) {
        *self.tokens.write().expect("token store poisoned") = Some(pair);
    }

    pub(crate) fn clear(&self) {
        *self.tokens.write().expect("token store poisoned") = None;
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .expect("token store poisoned")
            .as_ref()
            .map(|p| p.access_token.clone())
    }

    pub(crate) fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .expect("token store poisoned")
            .as_ref()
            .and_then(|p| p.refresh_token.clone())
    }
}
