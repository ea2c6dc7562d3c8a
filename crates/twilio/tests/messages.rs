//! Twilio client against an in-process fake Messages API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notifier::{
    AccountSid, OutboundSms, PhoneNumber, SecretValue, SmsCredentials, SmsError, SmsGateway,
};
use serde_json::json;
use twilio::TwilioClient;

type Received = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

async fn messages(
    State(received): State<Received>,
    Path(account): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let expected = format!("Basic {}", STANDARD.encode(format!("{account}:token-abc")));
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": 20003, "message": "Authenticate", "more_info": "https://www.twilio.com/docs/errors/20003", "status": 401})),
        )
            .into_response();
    }
    if form.get("To").map(String::as_str) == Some("+1000") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": 21211, "message": "The 'To' number +1000 is not a valid phone number.", "status": 400})),
        )
            .into_response();
    }
    if form.get("To").map(String::as_str) == Some("+1429") {
        return (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "2")], "slow down").into_response();
    }
    received.lock().unwrap().push((account, form));
    (
        StatusCode::CREATED,
        Json(json!({"sid": "SMfeedbeef", "status": "queued"})),
    )
        .into_response()
}

async fn spawn() -> (TwilioClient, Received) {
    let received = Received::default();
    let router = Router::new()
        .route("/2010-04-01/Accounts/{account}/Messages.json", post(messages))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    let client = TwilioClient::new(reqwest::Client::new()).with_base_url(format!("http://{addr}/"));
    (client, received)
}

fn credentials(token: &str) -> SmsCredentials {
    SmsCredentials {
        account_sid: AccountSid::new("AC123").unwrap(),
        auth_token: SecretValue::new(token),
    }
}

fn sms(to: &str) -> OutboundSms {
    OutboundSms {
        from: PhoneNumber::new("+15550001111").unwrap(),
        to: PhoneNumber::new(to).unwrap(),
        body: "Build SUCCESS for: api".to_string(),
    }
}

#[tokio::test]
async fn sends_form_with_basic_auth() {
    let (client, received) = spawn().await;

    let sid = client
        .send(&credentials("token-abc"), &sms("+15550002222"))
        .await
        .expect("sent");

    assert_eq!(sid.as_str(), "SMfeedbeef");
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (account, form) = &received[0];
    assert_eq!(account, "AC123");
    assert_eq!(form["From"], "+15550001111");
    assert_eq!(form["To"], "+15550002222");
    assert_eq!(form["Body"], "Build SUCCESS for: api");
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let (client, received) = spawn().await;

    let err = client
        .send(&credentials("wrong"), &sms("+15550002222"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SmsError::Rejected {
            status: 401,
            code: Some(20003),
            ..
        }
    ));
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_number_is_not_retryable() {
    let (client, _) = spawn().await;

    let err = client
        .send(&credentials("token-abc"), &sms("+1000"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmsError::Rejected { code: Some(21211), .. }));
    assert!(!err.retry_policy().is_retryable());
}

#[tokio::test]
async fn throttling_is_retryable() {
    let (client, _) = spawn().await;

    let err = client
        .send(&credentials("token-abc"), &sms("+1429"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SmsError::Unavailable {
            status: 429,
            retry_after: Some(d),
            ..
        } if d.as_secs() == 2
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let client = TwilioClient::new(reqwest::Client::new()).with_base_url("http://127.0.0.1:1");

    let err = client
        .send(&credentials("token-abc"), &sms("+15550002222"))
        .await
        .unwrap_err();

    assert!(matches!(err, SmsError::Transport { .. }));
}
