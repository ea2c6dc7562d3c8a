//! The build event carried by one pub/sub message.
//!
//! The transport hands over the message `data` field as base64 text. It
//! decodes to UTF-8 JSON describing one build: the top-level `status` and a
//! `substitutions` object whose `REPO_NAME` entry names the repository.
//! Everything else is optional and only used for diagnostics.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::{BuildStatus, RepoName};

/// Substitution key holding the repository name.
pub const REPO_NAME_SUBSTITUTION: &str = "REPO_NAME";

/// Errors produced while turning encoded message data into a [`BuildEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The data is not valid standard base64.
    #[error("payload is not valid base64")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The decoded text is not JSON, or its fields have unexpected types.
    #[error("payload is not a valid build event")]
    Json(#[from] serde_json::Error),

    /// The decoded JSON is valid but is not an object.
    #[error("payload is a JSON {kind}, expected an object")]
    NotAnObject {
        /// JSON type that was found instead.
        kind: &'static str,
    },
}

/// One decoded build event.
///
/// Only `status` and `substitutions.REPO_NAME` drive behaviour; both may be
/// absent. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    /// Build identifier.
    pub id: Option<String>,

    /// Project the build ran in.
    pub project_id: Option<String>,

    /// Raw status string (`SUCCESS`, `FAILURE`, `WORKING`, …).
    pub status: Option<String>,

    /// Link to the build log.
    pub log_url: Option<String>,

    /// Trigger that started the build.
    pub build_trigger_id: Option<String>,

    /// Substitution variables of the build (`REPO_NAME`, `BRANCH_NAME`, …).
    pub substitutions: Option<BTreeMap<String, String>>,
}

impl BuildEvent {
    /// Decodes base64 message data into a build event.
    ///
    /// Leading and trailing ASCII whitespace around the base64 text is
    /// ignored. Any other deviation is an error.
    pub fn decode(encoded: &[u8]) -> Result<Self, DecodeError> {
        let bytes = STANDARD.decode(encoded.trim_ascii())?;
        let text = String::from_utf8(bytes)?;
        tracing::debug!(payload = %text, "Received build notification");
        Self::from_json(&text)
    }

    /// Parses the JSON text of a build event.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject {
                kind: json_kind(&value),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the classified status, or `None` when the event carries none.
    pub fn status(&self) -> Option<BuildStatus> {
        self.status.as_deref().map(BuildStatus::parse)
    }

    /// Returns the substitution value for `key`, if present.
    pub fn substitution(&self, key: &str) -> Option<&str> {
        self.substitutions
            .as_ref()
            .and_then(|subs| subs.get(key))
            .map(String::as_str)
    }

    /// Returns the repository name, or `None` when `REPO_NAME` is absent or
    /// empty.
    pub fn repo_name(&self) -> Option<RepoName> {
        self.substitution(REPO_NAME_SUBSTITUTION)
            .and_then(RepoName::new)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
