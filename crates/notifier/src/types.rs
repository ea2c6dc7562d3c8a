//! Shared value types for the notifier domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaning the dispatcher branches on (build status) or content that must be
//! handled with care (secret values).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Build status
// ---------------------------------------------------------------------------

/// Status reported by a build event.
///
/// Only `SUCCESS` and `FAILURE` are terminal. Every other value the build
/// system emits (`QUEUED`, `WORKING`, `TIMEOUT`, `CANCELLED`, …) is kept
/// verbatim as [`BuildStatus::Interim`]; matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    /// The build finished successfully.
    Success,
    /// The build finished with a failure.
    Failure,
    /// Any other status string.
    Interim(String),
}

impl BuildStatus {
    /// Classifies a raw status string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            other => Self::Interim(other.to_string()),
        }
    }

    /// Returns `true` for statuses after which no further update is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Returns the status as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Interim(raw) => raw,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Secret values
// ---------------------------------------------------------------------------

/// Text content of one secret version.
///
/// `Debug` never prints the content, so a value can sit inside structures
/// that are logged without leaking credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wraps the decoded secret text.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the secret text without surrounding whitespace, or `None` if
    /// nothing is left.
    ///
    /// Secrets created with `echo ... | gcloud secrets create` carry a trailing
    /// newline that providers reject.
    pub fn trimmed(&self) -> Option<&str> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
