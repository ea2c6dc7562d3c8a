//! SMS gateway port.
//!
//! Infrastructure crates implement [`SmsGateway`] for a concrete provider.
//! Credentials are passed on every call because the dispatcher reads them
//! fresh from the secret store for each notification.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::{AccountSid, MessageSid, PhoneNumber, RetryPolicy, SecretValue};

/// Account credentials for the SMS provider.
#[derive(Debug, Clone)]
pub struct SmsCredentials {
    /// Provider account identifier.
    pub account_sid: AccountSid,
    /// Provider auth token.
    pub auth_token: SecretValue,
}

/// One text message to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSms {
    /// Sending number registered with the provider.
    pub from: PhoneNumber,
    /// Recipient number.
    pub to: PhoneNumber,
    /// Message text.
    pub body: String,
}

/// Capability to send a single SMS.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Submits `message` and returns the identifier the provider assigned.
    async fn send(
        &self,
        credentials: &SmsCredentials,
        message: &OutboundSms,
    ) -> Result<MessageSid, SmsError>;
}

/// Failures reported by an [`SmsGateway`].
#[derive(Debug, Error)]
pub enum SmsError {
    /// The provider refused the request (bad credentials, invalid number, …).
    #[error("SMS provider rejected the message (HTTP {status}{}): {message}", code_suffix(.code))]
    Rejected {
        /// HTTP status of the response.
        status: u16,
        /// Provider-specific error code, if supplied.
        code: Option<u32>,
        /// Provider error message.
        message: String,
    },

    /// The provider is temporarily unable to accept messages.
    #[error("SMS provider unavailable (HTTP {status}): {message}")]
    Unavailable {
        /// HTTP status of the response.
        status: u16,
        /// Provider error message.
        message: String,
        /// Delay suggested by the provider, if any.
        retry_after: Option<Duration>,
    },

    /// The provider accepted the request but its response could not be read.
    #[error("SMS provider returned an unreadable response: {message}")]
    InvalidResponse {
        /// What was wrong with the response.
        message: String,
    },

    /// The request never produced a response.
    #[error("SMS request failed: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },
}

fn code_suffix(code: &Option<u32>) -> String {
    code.map(|c| format!(", code {c}")).unwrap_or_default()
}

impl SmsError {
    /// Whether repeating the send could succeed.
    ///
    /// An unreadable response is not retryable: the message may already have
    /// been accepted, and a retry would duplicate it.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Unavailable { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Transport { .. } => RetryPolicy::Retryable { after: None },
            Self::Rejected { .. } | Self::InvalidResponse { .. } => RetryPolicy::NonRetryable,
        }
    }
}
