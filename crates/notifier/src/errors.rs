//! Top-level error and retry-policy types for the notifier domain.
//!
//! [`NotifierError`] covers every way handling one build event can fail.
//! Port-level errors ([`crate::SecretStoreError`], [`crate::SmsError`]) are
//! defined beside their traits and wrapped here.
//!
//! [`RetryPolicy`] is a cross-cutting concern: the transport uses it to pick
//! the response it gives the message broker. Nothing in this workspace
//! retries on its own.
//!
//! Wrapping variants never repeat their source in their own message; use
//! [`error_chain`] to render an error together with its causes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DecodeError, SecretName, SecretStoreError, SmsError};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// - `Retryable` errors: timeouts, connection failures, 429/5xx responses.
/// - `NonRetryable` errors: undecodable events, missing or unreadable
///   secrets, requests the SMS provider rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means the
        /// caller's own schedule applies.
        after: Option<Duration>,
    },
    /// The operation will fail the same way if repeated.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Invocation errors
// ---------------------------------------------------------------------------

/// Errors that fail the handling of one build event.
///
/// Missing optional fields are *not* errors; they end in a suppressed
/// notification instead.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The message data could not be decoded into a build event.
    #[error("Build event could not be decoded")]
    Decode(#[from] DecodeError),

    /// A secret needed for sending could not be read.
    #[error("Secret '{name}' could not be read")]
    SecretStore {
        /// Secret being read.
        name: SecretName,
        /// Underlying store failure.
        #[source]
        source: SecretStoreError,
    },

    /// A secret was read but holds nothing usable (empty or whitespace).
    #[error("Secret '{name}' does not hold a usable value")]
    InvalidSecret {
        /// Secret that was read.
        name: SecretName,
    },

    /// The SMS provider did not accept the notification.
    #[error("Notification could not be sent")]
    Sms(#[from] SmsError),
}

impl NotifierError {
    /// Whether redelivering the same event could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Decode(_) | Self::InvalidSecret { .. } => RetryPolicy::NonRetryable,
            Self::SecretStore { source, .. } => source.retry_policy(),
            Self::Sms(err) => err.retry_policy(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting helpers
// ---------------------------------------------------------------------------

/// Renders `err` followed by each of its sources, joined with `": "`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Parses a `Retry-After` header value given in delay-seconds.
///
/// HTTP-date values yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
