//! The request pipeline: one logical call from config to typed result.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::auth::{AuthDecision, AuthTokenManager, CsrfGuard};
use crate::cache::{CacheKey, ResponseCache};
use crate::config::{AuthMode, ClientConfig};
use crate::error::{ApiError, ErrorKind, ErrorNormalizer, Failure, InterceptorStage};
use crate::http::interceptor::{InterceptorChain, RequestInterceptor, ResponseInterceptor};
use crate::http::request::{insert_header, resolve_url, Body, Headers, RequestConfig, X_REQUEST_ID};
use crate::http::response::{ApiResponse, HttpResponse};
use crate::http::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::observability::metrics;
use crate::resilience::{CancelReason, CancellationController, RetryPolicy};

/// Resilient client for the dashboard API.
///
/// Cloning is cheap; clones share the transport, cache, credentials and
/// CSRF token.
#[derive(Clone)]
pub struct RequestPipeline {
    config: Arc<ClientConfig>,
    base_path: String,
    default_headers: Headers,
    transport: Arc<dyn Transport>,
    interceptors: InterceptorChain,
    cache: ResponseCache,
    auth: AuthTokenManager,
    csrf: CsrfGuard,
    policy: RetryPolicy,
}

impl RequestPipeline {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            ErrorNormalizer::normalize(Failure::InvalidUrl(format!(
                "invalid base URL {}: {}",
                config.base_url, e
            )))
        })?;

        let mut default_headers = Headers::new();
        for (name, value) in &config.headers {
            insert_header(&mut default_headers, name, value.clone());
        }

        let auth = AuthTokenManager::new(&config, transport.clone())?;
        let csrf = CsrfGuard::new(&config, transport.clone())?;
        let policy = RetryPolicy::from_config(&config.retries);

        Ok(Self {
            base_path: base.path().trim_end_matches('/').to_string(),
            config: Arc::new(config),
            default_headers,
            transport,
            interceptors: InterceptorChain::new(),
            cache: ResponseCache::new(),
            auth,
            csrf,
            policy,
        })
    }

    /// Build a pipeline over the production `reqwest` transport.
    pub fn with_reqwest(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new()
            .map_err(|e| ErrorNormalizer::normalize(Failure::Transport(e)))?;
        Self::new(config, Arc::new(transport))
    }

    /// Share an existing cache instead of the pipeline's own.
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = cache;
        self
    }

    /// Register a request interceptor; runs after those already registered.
    pub fn on_request(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptors.push_request(interceptor);
        self
    }

    /// Register a response interceptor; runs after those already registered.
    pub fn on_response(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.interceptors.push_response(interceptor);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthTokenManager {
        &self.auth
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(RequestConfig::get(path)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.execute(RequestConfig::post(path).json(body)).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.execute(RequestConfig::put(path).json(body)).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.execute(RequestConfig::patch(path).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(RequestConfig::delete(path)).await
    }

    /// Run one logical request and decode the payload into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, request: RequestConfig) -> Result<T, ApiError> {
        let response = self.execute_raw(request).await?;
        let status = response.status;
        serde_json::from_value(response.data)
            .map_err(|source| ErrorNormalizer::normalize(Failure::Decode { status, source }))
    }

    /// Run one logical request and return the decoded response as JSON.
    pub async fn execute_raw(&self, request: RequestConfig) -> Result<ApiResponse, ApiError> {
        let start = Instant::now();
        let method = request.method.clone();
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "api_request",
            request_id = %request_id,
            method = %method,
            url = %request.url
        );

        let result = self.run(request, request_id).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => outcome_label(err.kind()),
        };
        metrics::record_request(method.as_str(), outcome, start);
        result
    }

    async fn run(&self, request: RequestConfig, request_id: Uuid) -> Result<ApiResponse, ApiError> {
        let request = self.merge_defaults(request);
        let mut request = self.interceptors.apply_request(request).map_err(|source| {
            ErrorNormalizer::normalize(Failure::Interceptor {
                stage: InterceptorStage::Request,
                source,
            })
        })?;
        insert_header(&mut request.headers, X_REQUEST_ID, request_id.to_string());

        let url = resolve_url(&self.config.base_url, &request.url, &request.params).map_err(|e| {
            ErrorNormalizer::normalize(Failure::InvalidUrl(format!(
                "cannot resolve {}: {}",
                request.url, e
            )))
        })?;

        let controller = CancellationController::new(request.signal.clone(), request.timeout);
        controller.check().map_err(cancelled)?;

        // Lookup precedes CSRF/auth annotation: annotation is applied per
        // attempt inside dispatch, and a hit never dispatches, so a hit
        // also skips proactive refresh.
        let cache_key = (self.config.cache.enabled && request.is_cacheable())
            .then(|| CacheKey::new(&request.method, &url));
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                tracing::debug!(key = %key, "Served from cache");
                return Ok(hit);
            }
        }

        let response = self.dispatch(&request, &url, &controller).await?;
        self.complete(&request, &url, cache_key, response)
    }

    /// Fill in everything the caller left unset.
    fn merge_defaults(&self, mut request: RequestConfig) -> RequestConfig {
        let mut headers = self.default_headers.clone();
        headers.extend(std::mem::take(&mut request.headers));
        request.headers = headers;

        request
            .timeout
            .get_or_insert(Duration::from_millis(self.config.timeouts.request_ms));
        request
            .retries
            .get_or_insert(self.config.retries.default_retries);
        request
            .retry_delay
            .get_or_insert(Duration::from_millis(self.config.retries.base_delay_ms));
        request
    }

    /// Dispatch until success or a terminal failure.
    ///
    /// Auth and CSRF replays are not counted against `retries`.
    async fn dispatch(
        &self,
        request: &RequestConfig,
        url: &Url,
        controller: &CancellationController,
    ) -> Result<HttpResponse, ApiError> {
        let max_attempts = request.retries.unwrap_or(0).saturating_add(1);
        let base_delay = request.retry_delay.unwrap_or_default();

        let mut dispatches = 0u32;
        let mut replays = 0u32;
        let mut auth_retried = false;
        let mut csrf_retried = false;

        loop {
            if self.auth.mode() == AuthMode::Header {
                controller.run(self.auth.ensure_fresh()).await.map_err(cancelled)??;
            }

            let (attempt, used_token) = controller
                .run(self.build_attempt(request, url))
                .await
                .map_err(cancelled)?;

            dispatches += 1;
            metrics::record_dispatch(request.method.as_str());
            tracing::debug!(attempt = dispatches, url = %url, "Dispatching");

            let result = controller
                .run(self.transport.send(attempt))
                .await
                .map_err(cancelled)?;

            let failure = match result {
                Ok(response) if response.is_success() => {
                    tracing::debug!(status = response.status, attempts = dispatches, "Request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.status == 401 && self.config.auth.refresh_on_unauthorized => {
                    tracing::info!(attempt = dispatches, "Unauthorized, renewing session");
                    let decision = controller
                        .run(self.auth.handle_unauthorized(used_token.as_deref(), auth_retried))
                        .await
                        .map_err(cancelled)?;
                    match decision {
                        AuthDecision::Retry => {
                            auth_retried = true;
                            replays += 1;
                            continue;
                        }
                        AuthDecision::Fail(err) => return Err(err),
                    }
                }
                Ok(response) => Failure::Status(response),
                Err(e) => Failure::Transport(e),
            };
            let err = ErrorNormalizer::normalize(failure);

            if !csrf_retried
                && request.is_state_changing()
                && self.csrf.is_enabled()
                && CsrfGuard::is_csrf_rejection(&err)
            {
                tracing::info!(attempt = dispatches, "CSRF token rejected, refetching");
                controller.run(self.csrf.refresh()).await.map_err(cancelled)?;
                csrf_retried = true;
                replays += 1;
                continue;
            }

            let attempt_number = dispatches - replays;
            if !self.policy.should_retry(&err, attempt_number, max_attempts) {
                if attempt_number > 1 {
                    tracing::warn!(attempts = attempt_number, error = %err, "Giving up after retries");
                }
                return Err(err);
            }

            let delay = self.policy.delay(attempt_number - 1, base_delay, err.retry_after());
            tracing::info!(
                attempt = attempt_number,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Retrying request"
            );
            metrics::record_retry(retry_reason(&err));
            controller.sleep(delay).await.map_err(cancelled)?;
        }
    }

    /// Annotate one attempt. Returns the bearer token it carries, if any.
    async fn build_attempt(&self, request: &RequestConfig, url: &Url) -> (HttpRequest, Option<String>) {
        let mut headers = request.headers.clone();
        if request.is_state_changing() {
            headers = self.csrf.attach(headers, &request.method).await;
        }

        let credential = self.auth.get_credential();
        if let Some(token) = &credential {
            insert_header(&mut headers, "authorization", format!("Bearer {}", token));
        }

        if matches!(request.body, Some(Body::Json(_))) {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| "application/json".to_string());
        }

        let mut attempt = HttpRequest::new(request.method.clone(), url.clone());
        attempt.headers = headers;
        attempt.body = request.body.clone();
        (attempt, credential)
    }

    /// Decode, run response interceptors, then update the cache.
    fn complete(
        &self,
        request: &RequestConfig,
        url: &Url,
        cache_key: Option<CacheKey>,
        response: HttpResponse,
    ) -> Result<ApiResponse, ApiError> {
        let status = response.status;
        let data = response
            .decode()
            .map_err(|source| ErrorNormalizer::normalize(Failure::Decode { status, source }))?;
        let no_store = response.is_no_store();
        let max_age = response.cache_max_age();

        let decoded = ApiResponse {
            status,
            headers: response.headers,
            data,
        };
        let decoded = self.interceptors.apply_response(decoded).map_err(|source| {
            ErrorNormalizer::normalize(Failure::Interceptor {
                stage: InterceptorStage::Response,
                source,
            })
        })?;

        if let Some(key) = cache_key {
            if no_store {
                tracing::debug!(key = %key, "Response marked no-store, not cached");
            } else {
                let ttl = request
                    .cache_ttl
                    .or(max_age)
                    .unwrap_or(Duration::from_secs(self.config.cache.default_ttl_secs));
                self.cache.set(key, decoded.clone(), ttl);
            }
        }

        if request.is_state_changing() {
            self.invalidate_after_mutation(request, url);
        }
        Ok(decoded)
    }

    fn invalidate_after_mutation(&self, request: &RequestConfig, url: &Url) {
        if self.config.cache.invalidate_on_mutation {
            self.cache.invalidate(&format!("{}*", url.path()));
        }
        for pattern in &request.invalidates {
            self.cache.invalidate(&self.scoped_pattern(pattern));
        }
    }

    /// Patterns written relative to the API root are anchored at the base path.
    fn scoped_pattern(&self, pattern: &str) -> String {
        if pattern.starts_with('/') && !pattern.starts_with(&format!("{}/", self.base_path)) {
            format!("{}{}", self.base_path, pattern)
        } else {
            pattern.to_string()
        }
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("base_url", &self.config.base_url)
            .field("interceptors", &self.interceptors)
            .field("cache", &self.cache)
            .field("auth", &self.auth)
            .finish()
    }
}

fn cancelled(reason: CancelReason) -> ApiError {
    ErrorNormalizer::normalize(Failure::Cancelled(reason))
}

fn outcome_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Network => "network",
        ErrorKind::Timeout => "timeout",
        ErrorKind::Aborted => "aborted",
        ErrorKind::Http { .. } => "http",
        ErrorKind::Parse => "parse",
        ErrorKind::Auth => "auth",
    }
}

fn retry_reason(err: &ApiError) -> &'static str {
    match err.status() {
        Some(429) => "rate_limited",
        Some(_) => "server_error",
        None => "network",
    }
}
