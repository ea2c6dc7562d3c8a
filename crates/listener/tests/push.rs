//! Push receiver driven through the router with in-memory ports.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notifier::fakes::{MemorySecretStore, RecordingSmsGateway};
use notifier::{Dispatcher, SecretStoreError, SmsError, SmsSecretNames};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

struct Harness {
    router: Router,
    store: Arc<MemorySecretStore>,
    gateway: Arc<RecordingSmsGateway>,
}

fn harness_with(store: MemorySecretStore, gateway: RecordingSmsGateway) -> Harness {
    let store = Arc::new(store);
    let gateway = Arc::new(gateway);
    let dispatcher = Dispatcher::new(store.clone(), gateway.clone(), &SmsSecretNames::default())
        .expect("default names");
    Harness {
        router: listener::router(dispatcher),
        store,
        gateway,
    }
}

fn harness() -> Harness {
    harness_with(
        MemorySecretStore::twilio_defaults(),
        RecordingSmsGateway::new(),
    )
}

fn push(event: &serde_json::Value) -> Request<Body> {
    envelope(json!({
        "message": {
            "data": STANDARD.encode(event.to_string()),
            "messageId": "42",
            "publishTime": "2024-05-01T12:00:00Z"
        },
        "subscription": "projects/demo/subscriptions/builds"
    }))
}

fn envelope(body: serde_json::Value) -> Request<Body> {
    Request::post("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn success_event_sends_and_acks() {
    let h = harness();

    let response = h
        .router
        .oneshot(push(&json!({
            "status": "SUCCESS",
            "substitutions": {"REPO_NAME": "api"}
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.gateway.bodies(), vec!["Build SUCCESS for: api".to_string()]);
}

#[tokio::test]
async fn failure_event_on_pubsub_path() {
    let h = harness();
    let mut request = push(&json!({
        "status": "FAILURE",
        "substitutions": {"REPO_NAME": "web"}
    }));
    *request.uri_mut() = "/pubsub".parse().unwrap();

    let response = h.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.gateway.bodies(), vec!["Build FAILED for: web".to_string()]);
}

#[tokio::test]
async fn interim_and_incomplete_events_ack_without_sending() {
    for event in [
        json!({"status": "WORKING", "substitutions": {"REPO_NAME": "api"}}),
        json!({"status": "SUCCESS"}),
        json!({"substitutions": {"REPO_NAME": "api"}}),
    ] {
        let h = harness();

        let response = h.router.oneshot(push(&event)).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT, "event {event}");
        assert!(h.gateway.sent().is_empty());
        assert!(h.store.accessed().is_empty());
    }
}

#[tokio::test]
async fn undecodable_data_is_bad_request() {
    let h = harness();

    let response = h
        .router
        .oneshot(envelope(json!({"message": {"data": "%%% not base64"}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.starts_with("Build event could not be decoded: payload is not valid base64: "));
    assert_eq!(body.matches("payload is not valid base64").count(), 1);
    assert!(h.gateway.sent().is_empty());
}

#[tokio::test]
async fn missing_data_is_bad_request() {
    let h = harness();

    let response = h
        .router
        .oneshot(envelope(json!({"message": {"messageId": "1"}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_envelope_is_rejected() {
    let h = harness();

    let response = h
        .router
        .oneshot(envelope(json!({"subscription": "x"})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn retryable_send_failure_is_service_unavailable() {
    let h = harness_with(
        MemorySecretStore::twilio_defaults(),
        RecordingSmsGateway::failing(|| SmsError::Unavailable {
            status: 429,
            message: "Too Many Requests".into(),
            retry_after: Some(std::time::Duration::from_secs(30)),
        }),
    );

    let response = h
        .router
        .oneshot(push(&json!({
            "status": "SUCCESS",
            "substitutions": {"REPO_NAME": "api"}
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "30");
}

#[tokio::test]
async fn missing_secret_is_bad_gateway() {
    let h = harness_with(MemorySecretStore::new(), RecordingSmsGateway::new());

    let response = h
        .router
        .oneshot(push(&json!({
            "status": "SUCCESS",
            "substitutions": {"REPO_NAME": "api"}
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        body_text(response).await,
        "Secret 'twilio-acct-sid' could not be read: secret 'twilio-acct-sid' not found"
    );
    assert_eq!(h.store.accessed(), vec!["twilio-acct-sid"]);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let h = harness_with(
        MemorySecretStore::twilio_defaults().failing_with(|_| SecretStoreError::Transport {
            message: "connection reset".into(),
        }),
        RecordingSmsGateway::new(),
    );

    let response = h
        .router
        .oneshot(push(&json!({
            "status": "FAILURE",
            "substitutions": {"REPO_NAME": "api"}
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().get(header::RETRY_AFTER).is_none());
}

#[tokio::test]
async fn health_check() {
    let h = harness();

    let response = h
        .router
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn bound_listener_serves_until_shutdown() {
    let store = Arc::new(MemorySecretStore::twilio_defaults());
    let gateway = Arc::new(RecordingSmsGateway::new());
    let dispatcher = Dispatcher::new(store, gateway, &SmsSecretNames::default()).unwrap();
    let listener = listener::PushListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(listener.serve(dispatcher, async move {
        let _ = stopped.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}
