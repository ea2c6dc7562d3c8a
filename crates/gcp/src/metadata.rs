//! Compute metadata server client.
//!
//! Every Google-hosted runtime (Cloud Functions, Cloud Run, GCE) answers
//! `GET /computeMetadata/v1/...` on a link-local host when the request
//! carries `Metadata-Flavor: Google`. Two values are read: the project id
//! (once, at startup) and an OAuth access token for the runtime's service
//! account (before every Secret Manager call).

use std::time::Duration;

use notifier::{error_chain, ProjectId, SecretValue};
use serde::Deserialize;
use thiserror::Error;

/// Default metadata server address.
pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";

const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");
const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Failures talking to the metadata server.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The request could not be completed (not running on Google Cloud,
    /// timeout, …).
    #[error("metadata server request to {path} failed")]
    Request {
        /// Path that was requested.
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("metadata server returned HTTP {status} for {path}")]
    Status {
        /// Path that was requested.
        path: &'static str,
        /// HTTP status of the response.
        status: u16,
    },

    /// The server answered, but the body was not what was expected.
    #[error("metadata server returned an unexpected body for {path}: {message}")]
    InvalidBody {
        /// Path that was requested.
        path: &'static str,
        /// What was wrong with the body.
        message: String,
    },
}

/// An OAuth bearer token and its remaining lifetime.
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// Bearer token value.
    pub token: SecretValue,
    /// Seconds until the token expires, as reported by the issuer.
    pub expires_in: Option<Duration>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client for the metadata server.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: String,
}

impl MetadataClient {
    /// Creates a client for the metadata server at `base_url`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the id of the project the runtime belongs to.
    pub async fn project_id(&self) -> Result<ProjectId, MetadataError> {
        let response = self.get(PROJECT_ID_PATH).await?;
        let text = response
            .text()
            .await
            .map_err(|source| MetadataError::Request {
                path: PROJECT_ID_PATH,
                source,
            })?;
        ProjectId::new(text.trim()).ok_or_else(|| MetadataError::InvalidBody {
            path: PROJECT_ID_PATH,
            message: "empty project id".to_string(),
        })
    }

    /// Returns an access token for the runtime's default service account.
    pub async fn access_token(&self) -> Result<AccessToken, MetadataError> {
        let response = self.get(TOKEN_PATH).await?;
        let response: TokenResponse = response.json().await.map_err(|e| {
            MetadataError::InvalidBody {
                path: TOKEN_PATH,
                message: error_chain(&e),
            }
        })?;
        if response.access_token.is_empty() {
            return Err(MetadataError::InvalidBody {
                path: TOKEN_PATH,
                message: "empty access_token".to_string(),
            });
        }
        Ok(AccessToken {
            token: SecretValue::new(response.access_token),
            expires_in: response.expires_in.map(Duration::from_secs),
        })
    }

    async fn get(&self, path: &'static str) -> Result<reqwest::Response, MetadataError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(|source| MetadataError::Request { path, source })?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                path,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}
