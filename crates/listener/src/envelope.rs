//! Pub/Sub push delivery body.
//!
//! A push subscription POSTs one JSON envelope per message:
//!
//! ```json
//! {
//!   "message": {
//!     "data": "eyJzdGF0dXMiOiJTVUNDRVNTIn0=",
//!     "attributes": {"buildId": "b-1", "status": "SUCCESS"},
//!     "messageId": "2070443601311540",
//!     "publishTime": "2021-02-26T19:13:55.749Z"
//!   },
//!   "subscription": "projects/demo/subscriptions/cloud-builds-push"
//! }
//! ```
//!
//! The service also sends snake_case duplicates (`message_id`,
//! `publish_time`); they are ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use notifier::{PubSubMessageId, Timestamp};
use serde::Deserialize;

/// Body of one push delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEnvelope {
    /// The delivered message.
    pub message: PubSubMessage,
    /// Full name of the subscription that delivered it.
    #[serde(default)]
    pub subscription: Option<String>,
}

/// One Pub/Sub message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64 message payload. Pub/Sub omits it for attribute-only messages.
    #[serde(default)]
    pub data: Option<String>,
    /// Message attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Server-assigned message id.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Publish time as RFC 3339 text.
    #[serde(default)]
    pub publish_time: Option<String>,
}

impl PubSubMessage {
    /// Returns the message id, if the delivery carried a non-empty one.
    pub fn id(&self) -> Option<PubSubMessageId> {
        self.message_id.clone().and_then(PubSubMessageId::new)
    }

    /// Returns the publish time, if present and well-formed.
    pub fn published_at(&self) -> Option<Timestamp> {
        let raw = self.publish_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| Timestamp::from_utc(dt.with_timezone(&Utc)))
    }
}
