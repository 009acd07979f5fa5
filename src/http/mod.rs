//! HTTP request/response model and transport subsystem.
//!
//! # Data Flow
//! ```text
//! caller
//!     → request.rs (RequestConfig built by the caller)
//!     → interceptor.rs (ordered request transforms)
//!     → [pipeline annotates CSRF/auth headers, resolves URL]
//!     → transport.rs (one dispatch → HttpResponse | TransportError)
//!     → response.rs (decode, header interpretation)
//!     → interceptor.rs (ordered response transforms)
//! ```

pub mod interceptor;
pub mod mock;
pub mod request;
pub mod response;
pub mod transport;

pub use interceptor::{InterceptorChain, InterceptorError, RequestInterceptor, ResponseInterceptor};
pub use mock::MockTransport;
pub use request::{resolve_url, Body, Headers, QueryValue, RequestConfig, X_REQUEST_ID, X_REQUESTED_WITH};
pub use response::{ApiResponse, HttpResponse};
pub use transport::{HttpRequest, ReqwestTransport, Transport, TransportError};
