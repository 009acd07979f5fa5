//! Credential ownership and single-flight session refresh.
//!
//! # Responsibilities
//! - Hold the current token pair and hand out the bearer credential
//! - Run at most one refresh at a time; every caller that needs a refresh
//!   while one is pending awaits that same operation
//! - Decide what a 401 means for the request that received it
//! - Announce refreshes and invalidations on the session channel
//!
//! # Design Decisions
//! - The pending refresh is a `Shared` future stored behind a std mutex;
//!   check-and-set happens with no await in between
//! - The refresh future is spawned, so cancelling the request that
//!   started it does not cancel it for the others
//! - The refresh clears its own pending slot before resolving, even if it
//!   panics; a panic surfaces as a failed refresh

use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

use crate::auth::session::{SessionEvent, SessionEvents};
use crate::auth::tokens::{parse_refresh_body, TokenPair, TokenStore};
use crate::config::{AuthConfig, AuthMode, ClientConfig};
use crate::error::{ApiError, ErrorNormalizer, Failure};
use crate::http::request::{insert_header, resolve_url, Body, Headers};
use crate::http::transport::{HttpRequest, Transport};
use crate::observability::metrics;

type RefreshOutcome = Result<Option<TokenPair>, ApiError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// What the pipeline should do after a 401.
#[derive(Debug)]
pub enum AuthDecision {
    /// Credentials changed; replay the request once.
    Retry,
    /// The session is gone; surface this error.
    Fail(ApiError),
}

struct Inner {
    config: AuthConfig,
    refresh_url: Url,
    default_headers: Headers,
    transport: Arc<dyn Transport>,
    store: TokenStore,
    pending: Mutex<Option<PendingRefresh>>,
    events: SessionEvents,
}

/// Owner of the session credentials.
///
/// Cloning shares the same store and the same pending refresh.
#[derive(Clone)]
pub struct AuthTokenManager {
    inner: Arc<Inner>,
}

impl AuthTokenManager {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        let refresh_url = resolve_url(&config.base_url, &config.auth.refresh_path, &Default::default())
            .map_err(|e| {
                ErrorNormalizer::normalize(Failure::InvalidUrl(format!(
                    "invalid refresh URL {}: {}",
                    config.auth.refresh_path, e
                )))
            })?;

        let mut default_headers = Headers::new();
        for (name, value) in &config.headers {
            insert_header(&mut default_headers, name, value.clone());
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config: config.auth.clone(),
                refresh_url,
                default_headers,
                transport,
                store: TokenStore::default(),
                pending: Mutex::new(None),
                events: SessionEvents::new(),
            }),
        })
    }

    pub fn mode(&self) -> AuthMode {
        self.inner.config.mode
    }

    /// Install credentials after sign-in.
    pub fn set_tokens(&self, pair: TokenPair) {
        self.inner.store.set(pair);
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.inner.store.get()
    }

    /// Forget credentials without announcing anything (explicit sign-out).
    pub fn clear(&self) {
        self.inner.store.clear();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Bearer token to attach, if any. Cookie sessions never attach one.
    pub fn get_credential(&self) -> Option<String> {
        match self.inner.config.mode {
            AuthMode::Header => self.inner.store.access_token(),
            AuthMode::Cookie => None,
        }
    }

    pub fn is_refresh_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .expect("refresh slot poisoned")
            .is_some()
    }

    /// Refresh the session, joining the in-flight refresh if there is one.
    ///
    /// Every concurrent caller observes the same outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        let operation = {
            let mut pending = self.inner.pending.lock().expect("refresh slot poisoned");
            match pending.as_ref() {
                Some(operation) => {
                    metrics::record_refresh("joined");
                    tracing::debug!("Joining in-flight session refresh");
                    operation.clone()
                }
                None => {
                    metrics::record_refresh("started");
                    let inner = self.inner.clone();
                    let operation = AssertUnwindSafe(inner.clone().run_refresh())
                        .catch_unwind()
                        .map(move |result| result.unwrap_or_else(|_| Err(inner.refresh_panicked())))
                        .boxed()
                        .shared();
                    *pending = Some(operation.clone());
                    tokio::spawn(operation.clone());
                    operation
                }
            }
        };
        operation.await
    }

    /// Refresh ahead of dispatch when the access token is about to expire.
    ///
    /// Also waits out a refresh that is already pending, so new requests
    /// do not go out with a credential that is being replaced.
    pub async fn ensure_fresh(&self) -> Result<(), ApiError> {
        if self.inner.config.mode != AuthMode::Header {
            return Ok(());
        }

        let skew = Duration::from_secs(self.inner.config.expiry_skew_secs);
        let expiring = self
            .inner
            .store
            .get()
            .is_some_and(|pair| pair.refresh_token.is_some() && pair.expires_within(skew));

        if expiring || self.is_refresh_pending() {
            if expiring {
                tracing::debug!("Access token near expiry, refreshing before dispatch");
            }
            self.refresh().await?;
        }
        Ok(())
    }

    /// Decide how to continue after a 401.
    ///
    /// `used_token` is the credential the failed attempt carried and
    /// `already_retried` whether this request was already replayed once.
    pub async fn handle_unauthorized(&self, used_token: Option<&str>, already_retried: bool) -> AuthDecision {
        if already_retried {
            let err = ErrorNormalizer::normalize(Failure::Unauthorized { status: 401 });
            self.inner.invalidate(err.message());
            return AuthDecision::Fail(err);
        }

        // Another request already installed a different token; replay without a new refresh.
        if let Some(current) = self.get_credential() {
            if used_token != Some(current.as_str()) && !self.is_refresh_pending() {
                tracing::debug!("Credential changed since dispatch, replaying");
                return AuthDecision::Retry;
            }
        }

        match self.refresh().await {
            Ok(_) => AuthDecision::Retry,
            Err(err) => AuthDecision::Fail(err),
        }
    }

    /// Discard credentials and tell subscribers the session is over.
    pub fn invalidate_session(&self, reason: &str) {
        self.inner.invalidate(reason);
    }
}

impl Inner {
    async fn run_refresh(self: Arc<Self>) -> RefreshOutcome {
        let mut slot = PendingSlot::armed(&self.pending);
        tracing::info!(url = %self.refresh_url, "Refreshing session");
        let outcome = self.call_refresh_endpoint().await;

        match &outcome {
            Ok(pair) => {
                if let Some(pair) = pair {
                    self.store.set(pair.clone());
                }
                metrics::record_refresh("succeeded");
                tracing::info!("Session refreshed");
            }
            Err(err) => {
                metrics::record_refresh("failed");
                tracing::warn!(error = %err, "Session refresh failed");
            }
        }

        // Free the slot before any awaiter sees the outcome.
        slot.release();

        match &outcome {
            Ok(_) => self.events.publish(SessionEvent::Refreshed),
            Err(err) => self.invalidate(err.message()),
        }
        outcome
    }

    async fn call_refresh_endpoint(&self) -> RefreshOutcome {
        let refresh_failed = |cause: String, status: Option<u16>| {
            ErrorNormalizer::normalize(Failure::RefreshFailed { cause, status })
        };

        let previous_refresh = self.store.refresh_token();
        let mut request = HttpRequest::new(Method::POST, self.refresh_url.clone());
        request.headers = self.default_headers.clone();
        if self.config.mode == AuthMode::Header {
            let Some(refresh_token) = previous_refresh.clone() else {
                return Err(refresh_failed("no refresh token available".into(), None));
            };
            insert_header(&mut request.headers, "content-type", "application/json");
            request.body = Some(Body::Json(json!({ "refreshToken": refresh_token })));
        }

        let limit = Duration::from_millis(self.config.refresh_timeout_ms);
        let response = match tokio::time::timeout(limit, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(refresh_failed(e.to_string(), None)),
            Err(_) => {
                return Err(refresh_failed(
                    format!("no response within {}ms", limit.as_millis()),
                    None,
                ))
            }
        };

        if !response.is_success() {
            return Err(refresh_failed(
                format!("HTTP {} {}", response.status, response.reason()),
                Some(response.status),
            ));
        }

        let body = response
            .decode()
            .map_err(|e| refresh_failed(format!("invalid response body: {}", e), Some(response.status)))?;
        let pair = parse_refresh_body(body, previous_refresh)
            .map_err(|e| refresh_failed(e.to_string(), Some(response.status)))?;

        match (self.config.mode, pair) {
            (AuthMode::Header, None) => Err(refresh_failed(
                "response carried no access token".into(),
                Some(response.status),
            )),
            (_, pair) => Ok(pair),
        }
    }

    /// Outcome for a refresh whose future panicked. The slot was already
    /// freed while unwinding.
    fn refresh_panicked(&self) -> ApiError {
        metrics::record_refresh("failed");
        let err = ErrorNormalizer::normalize(Failure::RefreshFailed {
            cause: "refresh task panicked".into(),
            status: None,
        });
        tracing::error!("Session refresh panicked");
        self.invalidate(err.message());
        err
    }

    fn invalidate(&self, reason: &str) {
        self.store.clear();
        tracing::warn!(reason = %reason, "Session invalidated");
        self.events.publish(SessionEvent::Invalidated {
            reason: reason.to_string(),
        });
    }
}

/// Clears the pending-refresh slot when dropped, unless released first.
///
/// Only the running refresh holds one, so while it is armed the slot
/// still holds that refresh and not a newer one.
struct PendingSlot<'a> {
    slot: &'a Mutex<Option<PendingRefresh>>,
    armed: bool,
}

impl<'a> PendingSlot<'a> {
    fn armed(slot: &'a Mutex<Option<PendingRefresh>>) -> Self {
        Self { slot, armed: true }
    }

    fn release(&mut self) {
        self.slot.lock().expect("refresh slot poisoned").take();
        self.armed = false;
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut slot) = self.slot.lock() {
                slot.take();
            }
        }
    }
}

impl std::fmt::Debug for AuthTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokenManager")
            .field("mode", &self.inner.config.mode)
            .field("refresh_url", &self.inner.refresh_url.as_str())
            .field("has_credentials", &self.inner.store.get().is_some())
            .finish()
    }
}
