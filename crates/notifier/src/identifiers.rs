//! Newtype domain identifiers.
//!
//! Every value that names something outside the process (a secret, a phone
//! number, a message accepted by the SMS provider) is a distinct newtype
//! wrapping a `String`. This prevents accidentally passing, for example, a
//! [`PhoneNumber`] where a [`SecretName`] is expected even though both are
//! strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single handling of one build event.
///
/// Generated fresh for every delivery; recorded on the `dispatch` span so all
/// log lines from one invocation can be correlated even when the transport
/// supplies no message id of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Name of a secret in the secret store (e.g. `"twilio-acct-sid"`).
    ///
    /// The store resolves the name to its latest version; the name never
    /// carries a version suffix.
    SecretName
}

string_id! {
    /// Name of the source repository a build ran for, taken from the
    /// `REPO_NAME` substitution of the build event.
    RepoName
}

string_id! {
    /// A phone number in the form the SMS provider accepts (usually E.164,
    /// e.g. `"+15551234567"`).
    PhoneNumber
}

string_id! {
    /// Account identifier for the SMS provider (Twilio `AccountSid`).
    AccountSid
}

string_id! {
    /// Identifier the SMS provider assigned to an accepted message.
    MessageSid
}

string_id! {
    /// Cloud project identifier used to build secret resource names.
    ProjectId
}

string_id! {
    /// Identifier the pub/sub transport assigned to a delivered message.
    PubSubMessageId
}
