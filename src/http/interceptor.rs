//! Ordered request/response interceptor chains.
//!
//! Interceptors run in registration order, each receiving the previous
//! one's output. Returning an error short-circuits the chain; the
//! pipeline normalizes that error and aborts the call.

use std::sync::Arc;
use thiserror::Error;

use crate::http::request::RequestConfig;
use crate::http::response::ApiResponse;

/// Rejection raised by an interceptor.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InterceptorError {
    pub message: String,
    pub code: Option<String>,
}

impl InterceptorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Transforms an outgoing request before annotation and dispatch.
pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, request: RequestConfig) -> Result<RequestConfig, InterceptorError>;
}

/// Transforms a decoded successful response before caching and return.
pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, response: ApiResponse) -> Result<ApiResponse, InterceptorError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestConfig) -> Result<RequestConfig, InterceptorError> + Send + Sync,
{
    fn on_request(&self, request: RequestConfig) -> Result<RequestConfig, InterceptorError> {
        self(request)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(ApiResponse) -> Result<ApiResponse, InterceptorError> + Send + Sync,
{
    fn on_response(&self, response: ApiResponse) -> Result<ApiResponse, InterceptorError> {
        self(response)
    }
}

/// Registered interceptors, applied as a fold.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_request(&mut self, interceptor: impl RequestInterceptor + 'static) {
        self.request.push(Arc::new(interceptor));
    }

    pub fn push_response(&mut self, interceptor: impl ResponseInterceptor + 'static) {
        self.response.push(Arc::new(interceptor));
    }

    pub fn apply_request(&self, request: RequestConfig) -> Result<RequestConfig, InterceptorError> {
        self.request
            .iter()
            .try_fold(request, |req, interceptor| interceptor.on_request(req))
    }

    pub fn apply_response(&self, response: ApiResponse) -> Result<ApiResponse, InterceptorError> {
        self.response
            .iter()
            .try_fold(response, |resp, interceptor| interceptor.on_response(resp))
    }

    pub fn len(&self) -> usize {
        self.request.len() + self.response.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}
