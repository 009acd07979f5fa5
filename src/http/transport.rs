//! Transport seam between the pipeline and the network.
//!
//! # Responsibilities
//! - Send one fully-annotated request and return the raw response
//! - Report "no response" conditions as `TransportError`
//! - Expose the cookie jar to components that read cookie-borne tokens
//!
//! # Design Decisions
//! - One attempt per call; retries live in the pipeline
//! - Non-2xx responses are *not* errors at this layer

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::http::request::{Body, Headers};
use crate::http::response::HttpResponse;

/// A single attempt, ready for dispatch.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Body>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        crate::http::request::header_value(&self.headers, name)
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport's own deadline elapsed.
    #[error("transport timed out: {0}")]
    TimedOut(String),

    /// The request could not be built (bad header, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other I/O or protocol failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Sends HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatch one request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Value of cookie `name` as it would be sent to `url`.
    fn cookie(&self, _url: &Url, _name: &str) -> Option<String> {
        None
    }
}

/// Production transport backed by `reqwest` with a shared cookie jar.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::from_builder(Client::builder())
    }

    /// Finish a caller-tuned builder (proxies, TLS roots, pool limits).
    /// The cookie jar is always installed on top.
    pub fn from_builder(builder: ClientBuilder) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let client = builder
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client, jar })
    }

    /// Cookie jar shared with the underlying client.
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(headers);

        builder = match request.body {
            Some(Body::Json(value)) => builder.body(value.to_string()),
            Some(Body::Form(pairs)) => builder.form(&pairs),
            Some(Body::Raw {
                bytes,
                content_type,
            }) => builder.header(CONTENT_TYPE, content_type).body(bytes),
            None => builder,
        };

        let response = builder.send().await.map_err(classify)?;

        let status = response.status().as_u16();
        let mut out = HttpResponse::new(status);
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            out.headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        out.body = response.bytes().await.map_err(classify)?;
        Ok(out)
    }

    fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let raw = header.to_str().ok()?;
        raw.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::TimedOut(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
