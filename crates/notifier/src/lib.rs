//! Build notification domain.
//!
//! This crate decides whether a build event deserves a notification and, if
//! so, sends it. It owns the build event model, the decoding of pub/sub
//! message data, the message wording, and the port traits through which
//! credentials are read and SMS messages are sent. Infrastructure crates
//! implement those traits; they never add notification rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no I/O of its
//! own. It defines *what* is needed; infrastructure crates define *how* to
//! supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`SecretName`, `RepoName`, `PhoneNumber`, etc.) |
//! | [`types`] | Shared value types (`BuildStatus`, `SecretValue`, `Timestamp`) |
//! | [`event`] | `BuildEvent` and its decoding from base64 message data |
//! | [`dispatcher`] | Status classification and the `Dispatcher` |
//! | [`secrets`] | `SecretStore` port |
//! | [`sms`] | `SmsGateway` port |
//! | [`errors`] | Top-level error and retry-policy types |

pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod identifiers;
pub mod secrets;
pub mod sms;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fakes;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dispatcher::{
    decide, BuildResult, Decision, DispatchOutcome, Dispatcher, Notification, SmsSecretNames,
    SuppressReason, UNKNOWN_REPO_NAME,
};
pub use errors::{error_chain, parse_retry_after, NotifierError, RetryPolicy};
pub use event::{BuildEvent, DecodeError, REPO_NAME_SUBSTITUTION};
pub use identifiers::{
    AccountSid, InvocationId, MessageSid, PhoneNumber, ProjectId, PubSubMessageId, RepoName,
    SecretName,
};
pub use secrets::{SecretStore, SecretStoreError};
pub use sms::{OutboundSms, SmsCredentials, SmsError, SmsGateway};
pub use types::{BuildStatus, SecretValue, Timestamp};
