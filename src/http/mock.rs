//! Scripted transport for tests and offline development.
//!
//! Responses come from a handler closure that sees each request and the
//! zero-based number of earlier calls to the same path, which is enough
//! to script "fail twice then succeed" sequences.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::http::response::HttpResponse;
use crate::http::transport::{HttpRequest, Transport, TransportError};

type Handler = dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync;

/// In-memory transport that records every dispatched request.
pub struct MockTransport {
    handler: Box<Handler>,
    latency: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
    cookies: Mutex<HashMap<String, String>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            requests: Mutex::new(Vec::new()),
            cookies: Mutex::new(HashMap::new()),
        }
    }

    /// Answer every request with the same response.
    pub fn always(response: HttpResponse) -> Self {
        Self::new(move |_, _| Ok(response.clone()))
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed a cookie visible to every URL.
    pub fn with_cookie(self, name: &str, value: &str) -> Self {
        self.cookies
            .lock()
            .expect("mock cookie mutex poisoned")
            .insert(name.to_string(), value.to_string());
        self
    }

    /// All requests dispatched so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("mock request log poisoned").clone()
    }

    /// Number of requests dispatched to `path`.
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .iter()
            .filter(|r| r.url.path() == path)
            .count()
    }

    /// Total number of dispatched requests.
    pub fn total(&self) -> usize {
        self.requests.lock().expect("mock request log poisoned").len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let index = {
            let mut log = self.requests.lock().expect("mock request log poisoned");
            let index = log.iter().filter(|r| r.url.path() == request.url.path()).count();
            log.push(request.clone());
            index
        };

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        (self.handler)(&request, index)
    }

    fn cookie(&self, _url: &Url, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .expect("mock cookie mutex poisoned")
            .get(name)
            .cloned()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("latency", &self.latency)
            .field("dispatched", &self.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[tokio::test]
    async fn test_mock_counts_per_path() {
        let mock = MockTransport::new(|_req, index| {
            if index == 0 {
                Err(TransportError::Connect("refused".into()))
            } else {
                Ok(HttpResponse::new(200))
            }
        });

        let url: Url = "http://api.test/a".parse().unwrap();
        assert!(mock.send(HttpRequest::new(Method::GET, url.clone())).await.is_err());
        assert!(mock.send(HttpRequest::new(Method::GET, url)).await.is_ok());
        assert_eq!(mock.count("/a"), 2);
        assert_eq!(mock.count("/b"), 0);
    }
}
