//! Twilio SMS infrastructure adapter for the build notifier.
//!
//! Implements the [`notifier::SmsGateway`] trait over Twilio's Messages API:
//! `POST /2010-04-01/Accounts/{AccountSid}/Messages.json` with HTTP basic
//! auth and the form fields `From`, `To` and `Body`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Request formatting, authentication, response parsing
//! and HTTP status mapping live here. The [`notifier`] crate sees only
//! [`notifier::SmsGateway`]. No retries are made: a failed send is reported
//! once and the transport decides what happens next.

use std::time::Duration;

use async_trait::async_trait;
use notifier::{
    error_chain, parse_retry_after, MessageSid, OutboundSms, SmsCredentials, SmsError, SmsGateway,
};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Default Twilio REST API endpoint.
pub const DEFAULT_TWILIO_URL: &str = "https://api.twilio.com";

const API_VERSION: &str = "2010-04-01";

/// Successful `Messages.json` response (only the fields used).
#[derive(Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

/// Twilio error response body.
#[derive(Deserialize)]
struct TwilioErrorBody {
    code: Option<u32>,
    message: Option<String>,
    more_info: Option<String>,
}

/// [`SmsGateway`] backed by the Twilio REST API.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    base_url: String,
}

impl TwilioClient {
    /// Creates a client for the public Twilio endpoint.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_TWILIO_URL.to_string(),
        }
    }

    /// Points the client at another endpoint (regional edge, test double).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self, credentials: &SmsCredentials) -> String {
        format!(
            "{}/{}/Accounts/{}/Messages.json",
            self.base_url, API_VERSION, credentials.account_sid
        )
    }
}

#[async_trait]
impl SmsGateway for TwilioClient {
    #[instrument(skip_all, fields(account = %credentials.account_sid, to = %message.to))]
    async fn send(
        &self,
        credentials: &SmsCredentials,
        message: &OutboundSms,
    ) -> Result<MessageSid, SmsError> {
        let form = [
            ("From", message.from.as_str()),
            ("To", message.to.as_str()),
            ("Body", message.body.as_str()),
        ];
        let response = self
            .http
            .post(self.messages_url(credentials))
            .basic_auth(
                credentials.account_sid.as_str(),
                Some(credentials.auth_token.expose()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::Transport {
                message: error_chain(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body, retry_after));
        }

        let resource: MessageResource =
            response.json().await.map_err(|e| SmsError::InvalidResponse {
                message: error_chain(&e),
            })?;
        debug!(
            status = resource.status.as_deref().unwrap_or_default(),
            "Twilio accepted message"
        );
        resource
            .sid
            .and_then(MessageSid::new)
            .ok_or_else(|| SmsError::InvalidResponse {
                message: "response has no sid".to_string(),
            })
    }
}

fn classify_failure(status: StatusCode, body: &str, retry_after: Option<Duration>) -> SmsError {
    let parsed = serde_json::from_str::<TwilioErrorBody>(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code);
    let message = match parsed {
        Some(TwilioErrorBody {
            message: Some(message),
            more_info: Some(more_info),
            ..
        }) => format!("{message} ({more_info})"),
        Some(TwilioErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ => body.trim().to_string(),
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SmsError::Unavailable {
            status: status.as_u16(),
            message,
            retry_after,
        }
    } else {
        SmsError::Rejected {
            status: status.as_u16(),
            code,
            message,
        }
    }
}
