//! Single translation point from raw failures to `ApiError`.

use serde_json::Value;
use std::time::Duration;

use crate::error::{
    ApiError, ErrorKind, CODE_INTERCEPTOR_REJECTED, CODE_INVALID_REQUEST, CODE_REFRESH_FAILED,
    CODE_SESSION_EXPIRED,
};
use crate::http::interceptor::InterceptorError;
use crate::http::response::HttpResponse;
use crate::http::transport::TransportError;
use crate::resilience::cancellation::CancelReason;

/// Which interceptor chain rejected the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorStage {
    Request,
    Response,
}

/// Every failure shape the pipeline can observe.
#[derive(Debug)]
pub enum Failure {
    /// No response received.
    Transport(TransportError),
    /// Well-formed non-2xx response.
    Status(HttpResponse),
    /// Body or payload could not be decoded.
    Decode { status: u16, source: serde_json::Error },
    /// Caller cancellation or internal deadline.
    Cancelled(CancelReason),
    /// An interceptor short-circuited the call.
    Interceptor { stage: InterceptorStage, source: InterceptorError },
    /// The refresh endpoint could not renew the session.
    RefreshFailed { cause: String, status: Option<u16> },
    /// A 401 arrived for a request that was already replayed after a refresh.
    Unauthorized { status: u16 },
    /// The target URL could not be resolved against the base URL.
    InvalidUrl(String),
}

/// Maps `Failure` values into the caller-visible taxonomy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorNormalizer;

impl ErrorNormalizer {
    pub fn normalize(failure: Failure) -> ApiError {
        match failure {
            Failure::Transport(TransportError::InvalidRequest(msg)) => {
                ApiError::new(ErrorKind::Network, msg).with_code(CODE_INVALID_REQUEST)
            }
            Failure::Transport(TransportError::TimedOut(msg)) => ApiError::new(ErrorKind::Timeout, msg),
            Failure::Transport(e) => ApiError::new(ErrorKind::Network, e.to_string()),
            Failure::Status(response) => Self::from_status(response),
            Failure::Decode { status, source } => {
                ApiError::new(ErrorKind::Parse, format!("invalid response body (HTTP {}): {}", status, source))
            }
            Failure::Cancelled(CancelReason::Aborted) => {
                ApiError::new(ErrorKind::Aborted, "request was cancelled")
            }
            Failure::Cancelled(CancelReason::TimedOut(after)) => ApiError::new(
                ErrorKind::Timeout,
                format!("request timed out after {}ms", after.as_millis()),
            ),
            Failure::Interceptor { stage, source } => {
                let kind = match stage {
                    InterceptorStage::Request => ErrorKind::Aborted,
                    InterceptorStage::Response => ErrorKind::Parse,
                };
                let code = source.code.unwrap_or_else(|| CODE_INTERCEPTOR_REJECTED.to_string());
                ApiError::new(kind, source.message).with_code(code)
            }
            Failure::RefreshFailed { cause, status } => {
                let err = ApiError::new(ErrorKind::Auth, format!("session refresh failed: {}", cause))
                    .with_code(CODE_REFRESH_FAILED);
                match status {
                    Some(status) => err.with_details(serde_json::json!({ "status": status })),
                    None => err,
                }
            }
            Failure::Unauthorized { status } => ApiError::new(
                ErrorKind::Auth,
                format!("request still unauthorized (HTTP {}) after session refresh", status),
            )
            .with_code(CODE_SESSION_EXPIRED),
            Failure::InvalidUrl(msg) => {
                ApiError::new(ErrorKind::Network, msg).with_code(CODE_INVALID_REQUEST)
            }
        }
    }

    fn from_status(response: HttpResponse) -> ApiError {
        let retry_after: Option<Duration> = response.retry_after();
        let kind = ErrorKind::Http {
            status: response.status,
        };

        let body = response.decode().ok();
        let (message, code, details) = match body {
            Some(Value::Object(map)) => {
                let message = map
                    .get("message")
                    .or_else(|| map.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let code = map.get("code").and_then(Value::as_str).map(str::to_string);
                let details = map
                    .get("details")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(map.clone()));
                (message, code, Some(details))
            }
            Some(Value::String(text)) if !text.trim().is_empty() => {
                (Some(text.trim().to_string()), None, None)
            }
            _ => (None, None, None),
        };

        let mut err = ApiError::new(kind, message.unwrap_or_else(|| response.reason().to_string()))
            .with_retry_after(retry_after);
        if let Some(code) = code {
            err = err.with_code(code);
        }
        if let Some(details) = details {
            err = err.with_details(details);
        }
        err
    }
}
