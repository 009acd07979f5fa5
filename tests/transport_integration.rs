//! End-to-end tests through `ReqwestTransport` against a local TCP backend.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashboard_client::http::ReqwestTransport;
use dashboard_client::{ClientConfig, ErrorKind, RequestConfig, RequestPipeline, TokenPair};

mod common;
use common::{config_for, start_programmable_backend, Reply};

fn pipeline(config: ClientConfig) -> RequestPipeline {
    let transport = ReqwestTransport::from_builder(reqwest::Client::builder().no_proxy()).unwrap();
    RequestPipeline::new(config, Arc::new(transport)).unwrap()
}

#[tokio::test]
async fn test_get_decodes_json_and_sends_default_headers() {
    let (addr, log) = start_programmable_backend(|_req| async {
        Reply::json(200, json!({"items": [1, 2, 3]}))
    })
    .await;

    let client = pipeline(config_for(addr));
    let body: Value = client
        .execute(RequestConfig::get("/contacts").param("page", 2))
        .await
        .unwrap();
    assert_eq!(body, json!({"items": [1, 2, 3]}));

    let seen = log.lock().unwrap()[0].clone();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.path, "/api/contacts?page=2");
    assert_eq!(seen.header("x-requested-with"), Some("XMLHttpRequest"));
    assert!(seen.header("x-request-id").is_some());
    assert!(seen.header("x-csrf-token").is_none());
}

#[tokio::test]
async fn test_retries_transient_503() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let (addr, _log) = start_programmable_backend(move |_req| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Reply::json(503, json!({"message": "warming up"}))
            } else {
                Reply::json(200, json!({"ok": true}))
            }
        }
    })
    .await;

    let client = pipeline(config_for(addr));
    let body: Value = client
        .execute(RequestConfig::get("/health").retries(2))
        .await
        .unwrap();

    assert_eq!(body, json!({"ok": true}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_http_error_carries_server_message() {
    let (addr, _log) = start_programmable_backend(|_req| async {
        Reply::json(400, json!({"message": "title is required", "code": "validation"}))
    })
    .await;

    let client = pipeline(config_for(addr));
    client.csrf().set_token("t");
    let err = client
        .post::<Value>("/tasks", json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Http { status: 400 });
    assert_eq!(err.message(), "title is required");
    assert_eq!(err.code(), Some("validation"));
}

#[tokio::test]
async fn test_csrf_token_read_from_cookie_jar() {
    let (addr, log) = start_programmable_backend(|req| async move {
        if req.path == "/api/session" {
            Reply::json(200, json!({"user": "ada"})).header("Set-Cookie", "csrf_token=cookie-token; Path=/")
        } else {
            Reply::json(201, json!({"id": 9}))
        }
    })
    .await;

    let client = pipeline(config_for(addr));
    let _: Value = client.get("/session").await.unwrap();
    let _: Value = client.post("/tasks", json!({"title": "call"})).await.unwrap();

    let requests = log.lock().unwrap().clone();
    let post = requests.iter().find(|r| r.method == "POST").unwrap();
    assert_eq!(post.header("x-csrf-token"), Some("cookie-token"));
    assert_eq!(post.header("content-type"), Some("application/json"));
    assert_eq!(serde_json::from_str::<Value>(&post.body).unwrap(), json!({"title": "call"}));
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_replays() {
    let (addr, log) = start_programmable_backend(|req| async move {
        match req.path.as_str() {
            "/api/auth/refresh" => Reply::json(200, json!({"accessToken": "fresh"})),
            _ if req.header("authorization") == Some("Bearer fresh") => {
                Reply::json(200, json!({"data": "success"}))
            }
            _ => Reply::json(401, json!({"message": "token expired"})),
        }
    })
    .await;

    let client = pipeline(config_for(addr));
    client.auth().set_tokens(TokenPair::new("stale", Some("r1".into())));

    let body: Value = client.get("/me").await.unwrap();
    assert_eq!(body, json!({"data": "success"}));

    let requests = log.lock().unwrap().clone();
    let refresh = requests.iter().find(|r| r.path == "/api/auth/refresh").unwrap();
    assert_eq!(serde_json::from_str::<Value>(&refresh.body).unwrap(), json!({"refreshToken": "r1"}));
    assert_eq!(requests.iter().filter(|r| r.path == "/api/me").count(), 2);
    assert_eq!(
        client.auth().tokens().unwrap().refresh_token.as_deref(),
        Some("r1")
    );
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let (addr, _log) = start_programmable_backend(|_req| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Reply::json(200, json!({}))
    })
    .await;

    let client = pipeline(config_for(addr));
    let err = client
        .execute::<Value>(RequestConfig::get("/slow").timeout(Duration::from_millis(50)).retries(3))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
}
