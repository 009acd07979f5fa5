//! Anti-forgery token handling for state-changing requests.

use reqwest::Method;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use url::Url;

use crate::config::{ClientConfig, CsrfConfig};
use crate::error::{ApiError, ErrorNormalizer, Failure};
use crate::http::request::{insert_header, is_state_changing, resolve_url, Headers};
use crate::http::transport::{HttpRequest, Transport};

/// Attaches the CSRF token to POST/PUT/PATCH/DELETE requests.
///
/// The token is looked up in order: the cached value, the configured
/// cookie, then the token endpoint.
#[derive(Clone)]
pub struct CsrfGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    config: CsrfConfig,
    base_url: Url,
    token_url: Option<Url>,
    default_headers: Headers,
    transport: Arc<dyn Transport>,
    token: RwLock<Option<String>>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl CsrfGuard {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ApiError> {
        let invalid = |what: &str, e: url::ParseError| {
            ErrorNormalizer::normalize(Failure::InvalidUrl(format!("invalid {}: {}", what, e)))
        };

        let base_url = Url::parse(&config.base_url).map_err(|e| invalid("base URL", e))?;
        let token_url = config
            .csrf
            .token_path
            .as_deref()
            .map(|path| resolve_url(&config.base_url, path, &Default::default()))
            .transpose()
            .map_err(|e| invalid("CSRF token URL", e))?;

        let mut default_headers = Headers::new();
        for (name, value) in &config.headers {
            insert_header(&mut default_headers, name, value.clone());
        }

        Ok(Self {
            inner: Arc::new(GuardInner {
                config: config.csrf.clone(),
                base_url,
                token_url,
                default_headers,
                transport,
                token: RwLock::new(None),
                fetch_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Header name the token travels in.
    pub fn header_name(&self) -> &str {
        &self.inner.config.header_name
    }

    /// Add the token header when `method` changes state and a token is available.
    pub async fn attach(&self, mut headers: Headers, method: &Method) -> Headers {
        if !self.is_enabled() || !is_state_changing(method) {
            return headers;
        }
        match self.token().await {
            Some(token) => insert_header(&mut headers, &self.inner.config.header_name, token),
            None => tracing::debug!("No CSRF token available, sending without one"),
        }
        headers
    }

    /// Current token, fetching it if nothing is cached yet.
    pub async fn token(&self) -> Option<String> {
        if let Some(token) = self.cached() {
            return Some(token);
        }
        if let Some(token) = self.from_cookie() {
            return Some(token);
        }
        self.fetch().await
    }

    /// Discard the cached token and obtain a new one.
    pub async fn refresh(&self) -> Option<String> {
        self.clear();
        match self.inner.token_url {
            Some(_) => self.fetch().await,
            None => self.from_cookie(),
        }
    }

    /// Install a token received out of band (e.g. from a sign-in response).
    pub fn set_token(&self, token: impl Into<String>) {
        *self.inner.token.write().expect("csrf token poisoned") = Some(token.into());
    }

    pub fn clear(&self) {
        *self.inner.token.write().expect("csrf token poisoned") = None;
    }

    /// True for a 403 whose code or message names CSRF.
    pub fn is_csrf_rejection(error: &ApiError) -> bool {
        if error.status() != Some(403) {
            return false;
        }
        let mentions = |text: &str| text.to_ascii_lowercase().contains("csrf");
        error.code().is_some_and(mentions) || mentions(error.message())
    }

    fn cached(&self) -> Option<String> {
        self.inner.token.read().expect("csrf token poisoned").clone()
    }

    fn from_cookie(&self) -> Option<String> {
        let name = self.inner.config.cookie_name.as_deref()?;
        self.inner.transport.cookie(&self.inner.base_url, name)
    }

    async fn fetch(&self) -> Option<String> {
        let url = self.inner.token_url.clone()?;
        let _guard = self.inner.fetch_lock.lock().await;

        // Another task may have fetched while we waited.
        if let Some(token) = self.cached() {
            return Some(token);
        }

        let mut request = HttpRequest::new(Method::GET, url.clone());
        request.headers = self.inner.default_headers.clone();

        let response = match self.inner.transport.send(request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(url = %url, status = response.status, "CSRF token endpoint refused");
                return None;
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "CSRF token fetch failed");
                return None;
            }
        };

        let token = response.decode().ok().and_then(|body| extract_token(&body));
        match &token {
            Some(token) => {
                self.set_token(token.clone());
                tracing::debug!("Fetched CSRF token");
            }
            None => tracing::warn!(url = %url, "CSRF token endpoint returned no token"),
        }
        token
    }
}

fn extract_token(body: &Value) -> Option<String> {
    let body = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
    body.get("csrfToken")
        .or_else(|| body.get("csrf_token"))
        .or_else(|| body.get("token"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("enabled", &self.inner.config.enabled)
            .field("header_name", &self.inner.config.header_name)
            .field("has_token", &self.cached().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::mock::MockTransport;
    use crate::http::request::header_value;
    use crate::http::response::HttpResponse;
    use serde_json::json;

    fn guard(mock: Arc<MockTransport>) -> CsrfGuard {
        let config = ClientConfig {
            base_url: "http://api.test/api".into(),
            ..Default::default()
        };
        CsrfGuard::new(&config, mock).unwrap()
    }

    fn token_endpoint() -> Arc<MockTransport> {
        Arc::new(MockTransport::new(|_, index| {
            Ok(HttpResponse::json(200, &json!({ "csrfToken": format!("t{}", index) })))
        }))
    }

    #[tokio::test]
    async fn test_attach_only_on_state_changing() {
        let mock = token_endpoint();
        let csrf = guard(mock.clone());

        let headers = csrf.attach(Headers::new(), &Method::GET).await;
        assert!(header_value(&headers, "X-CSRF-Token").is_none());
        assert_eq!(mock.total(), 0);

        let headers = csrf.attach(Headers::new(), &Method::POST).await;
        assert_eq!(header_value(&headers, "X-CSRF-Token"), Some("t0"));

        // Cached after the first fetch.
        csrf.attach(Headers::new(), &Method::DELETE).await;
        assert_eq!(mock.count("/api/auth/csrf-token"), 1);
    }

    #[tokio::test]
    async fn test_cookie_before_endpoint() {
        let mock = Arc::new(
            MockTransport::always(HttpResponse::json(200, &json!({"csrfToken": "from-endpoint"})))
                .with_cookie("csrf_token", "from-cookie"),
        );
        let csrf = guard(mock.clone());

        assert_eq!(csrf.token().await.as_deref(), Some("from-cookie"));
        assert_eq!(mock.total(), 0);
    }

    #[tokio::test]
    async fn test_refresh_replaces_token() {
        let mock = token_endpoint();
        let csrf = guard(mock.clone());

        assert_eq!(csrf.token().await.as_deref(), Some("t0"));
        assert_eq!(csrf.refresh().await.as_deref(), Some("t1"));
        assert_eq!(csrf.token().await.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_unavailable_token_is_skipped() {
        let mock = Arc::new(MockTransport::always(HttpResponse::new(500)));
        let csrf = guard(mock);

        let headers = csrf.attach(Headers::new(), &Method::POST).await;
        assert!(headers.is_empty());
    }

    #[test]
    fn test_rejection_detection() {
        let csrf_err = ErrorNormalizer::normalize(Failure::Status(HttpResponse::json(
            403,
            &json!({"message": "Invalid CSRF token"}),
        )));
        assert!(CsrfGuard::is_csrf_rejection(&csrf_err));

        let coded = ErrorNormalizer::normalize(Failure::Status(HttpResponse::json(
            403,
            &json!({"message": "Forbidden", "code": "EBADCSRFTOKEN"}),
        )));
        assert!(CsrfGuard::is_csrf_rejection(&coded));

        let forbidden = ErrorNormalizer::normalize(Failure::Status(HttpResponse::json(
            403,
            &json!({"message": "Not your contact"}),
        )));
        assert_eq!(forbidden.kind(), ErrorKind::Http { status: 403 });
        assert!(!CsrfGuard::is_csrf_rejection(&forbidden));
    }
}
