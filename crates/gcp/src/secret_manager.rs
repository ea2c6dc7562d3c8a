//! Secret Manager REST client.
//!
//! Reads `projects/{project}/secrets/{name}/versions/latest` through
//! `GET /v1/{resource}:access`. The response carries the secret bytes as
//! base64 in `payload.data`; they must decode to UTF-8 text.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notifier::{
    error_chain, parse_retry_after, ProjectId, SecretName, SecretStore, SecretStoreError,
    SecretValue,
};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::TokenSource;

/// Default Secret Manager API endpoint.
pub const DEFAULT_SECRET_MANAGER_URL: &str = "https://secretmanager.googleapis.com";

/// Version alias read for every secret.
pub const LATEST_VERSION: &str = "latest";

#[derive(Deserialize)]
struct AccessResponse {
    name: Option<String>,
    payload: Option<Payload>,
}

#[derive(Deserialize)]
struct Payload {
    data: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`SecretStore`] backed by Google Secret Manager.
#[derive(Debug, Clone)]
pub struct SecretManagerClient {
    http: reqwest::Client,
    base_url: String,
    project: ProjectId,
    tokens: TokenSource,
}

impl SecretManagerClient {
    /// Creates a client reading secrets of `project` from the public endpoint.
    pub fn new(http: reqwest::Client, project: ProjectId, tokens: TokenSource) -> Self {
        Self {
            http,
            base_url: DEFAULT_SECRET_MANAGER_URL.to_string(),
            project,
            tokens,
        }
    }

    /// Points the client at another endpoint (regional endpoint, emulator).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the resource name of the latest version of `name`.
    pub fn version_resource(&self, name: &SecretName) -> String {
        format!(
            "projects/{}/secrets/{}/versions/{}",
            self.project, name, LATEST_VERSION
        )
    }
}

#[async_trait]
impl SecretStore for SecretManagerClient {
    #[instrument(skip(self), fields(project = %self.project))]
    async fn access_latest(&self, name: &SecretName) -> Result<SecretValue, SecretStoreError> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| SecretStoreError::Transport {
                message: error_chain(&e),
            })?;

        let url = format!("{}/v1/{}:access", self.base_url, self.version_resource(name));
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| SecretStoreError::Transport {
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
            return Err(classify_failure(name, status, &body, retry_after));
        }

        let body: AccessResponse = response.json().await.map_err(|e| {
            SecretStoreError::InvalidPayload {
                name: name.clone(),
                message: error_chain(&e),
            }
        })?;
        debug!(version = body.name.as_deref().unwrap_or_default(), "Secret accessed");

        let data = body
            .payload
            .and_then(|p| p.data)
            .ok_or_else(|| SecretStoreError::InvalidPayload {
                name: name.clone(),
                message: "response has no payload.data".to_string(),
            })?;
        decode_payload(name, &data)
    }
}

fn decode_payload(name: &SecretName, data: &str) -> Result<SecretValue, SecretStoreError> {
    let invalid = |message: String| SecretStoreError::InvalidPayload {
        name: name.clone(),
        message,
    };
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| invalid(format!("payload is not base64: {e}")))?;
    let text =
        String::from_utf8(bytes).map_err(|e| invalid(format!("payload is not UTF-8: {e}")))?;
    Ok(SecretValue::new(text))
}

fn classify_failure(
    name: &SecretName,
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> SecretStoreError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::NOT_FOUND => SecretStoreError::NotFound { name: name.clone() },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            SecretStoreError::PermissionDenied { name: name.clone() }
        }
        StatusCode::TOO_MANY_REQUESTS => SecretStoreError::Unavailable {
            message,
            retry_after,
        },
        s if s.is_server_error() => SecretStoreError::Unavailable {
            message,
            retry_after,
        },
        s => SecretStoreError::Rejected {
            name: name.clone(),
            status: s.as_u16(),
            message,
        },
    }
}
