//! Build notifier trigger source.
//!
//! Receives Cloud Build notifications from a Pub/Sub push subscription and
//! hands each message's `data` to [`notifier::Dispatcher`].
//!
//! ## Deployment Scenarios
//!
//! | Scenario | Entry point | Notes |
//! |----------|-------------|-------|
//! | Cloud Run / Cloud Functions (2nd gen) | [`PushListener`] | Listens on `$PORT` |
//! | Local testing | `dispatch` command in `cli` | No listener needed |
//!
//! ## Response Codes
//!
//! | Result | Status |
//! |--------|--------|
//! | Notified, suppressed or interim | `204 No Content` |
//! | Malformed envelope or undecodable event | `400 Bad Request` |
//! | Retryable secret-store / SMS failure | `503 Service Unavailable` (+ `Retry-After`) |
//! | Other secret-store / SMS failure | `502 Bad Gateway` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and envelope deserialization live here.
//! The [`notifier`] crate sees only the base64 message data.

pub mod envelope;
pub mod server;

pub use envelope::{PubSubMessage, PushEnvelope};
pub use server::{error_response, router, ListenerError, PushListener};
