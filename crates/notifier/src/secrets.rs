//! Secret store port.
//!
//! The dispatcher reads provider credentials and phone numbers by name at the
//! moment it sends a notification. Infrastructure crates implement
//! [`SecretStore`] for a concrete backend.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{RetryPolicy, SecretName, SecretValue};

/// Read-only access to named secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the text of the latest version of the secret called `name`.
    async fn access_latest(&self, name: &SecretName) -> Result<SecretValue, SecretStoreError>;
}

/// Failures reported by a [`SecretStore`].
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// No secret (or no enabled version) exists under the name.
    #[error("secret '{name}' not found")]
    NotFound {
        /// Secret that was requested.
        name: SecretName,
    },

    /// The caller's identity may not read the secret.
    #[error("permission denied reading secret '{name}'")]
    PermissionDenied {
        /// Secret that was requested.
        name: SecretName,
    },

    /// The backend refused the request for another reason (malformed name,
    /// disabled API, …).
    #[error("secret store rejected the read of '{name}' (HTTP {status}): {message}")]
    Rejected {
        /// Secret that was requested.
        name: SecretName,
        /// HTTP status of the response.
        status: u16,
        /// Backend error description.
        message: String,
    },

    /// The backend is temporarily unable to serve the request.
    #[error("secret store unavailable: {message}")]
    Unavailable {
        /// Backend error description.
        message: String,
        /// Delay suggested by the backend, if any.
        retry_after: Option<Duration>,
    },

    /// The backend answered, but the payload could not be interpreted.
    #[error("secret '{name}' has an unreadable payload: {message}")]
    InvalidPayload {
        /// Secret that was requested.
        name: SecretName,
        /// What was wrong with the payload.
        message: String,
    },

    /// The request never produced a response (connection, timeout, auth
    /// token acquisition).
    #[error("secret store request failed: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

impl SecretStoreError {
    /// Whether repeating the read could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Unavailable { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Transport { .. } => RetryPolicy::Retryable { after: None },
            Self::NotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::Rejected { .. }
            | Self::InvalidPayload { .. } => RetryPolicy::NonRetryable,
        }
    }
}
