//! Build event interpretation and notification dispatch.
//!
//! [`decide`] is the pure part: it looks at a decoded [`BuildEvent`] and says
//! whether a notification is due. [`Dispatcher`] runs the whole invocation:
//! decode, decide, read the provider secrets, send, log.
//!
//! ```text
//!            ┌── status missing ─────────────┐
//! decode ──► ├── terminal, no REPO_NAME ─────┤──► suppressed
//!            ├── interim status ─────────────┘──► interim
//!            └── terminal + REPO_NAME ──► secrets ──► send ──► notified
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{
    AccountSid, BuildEvent, BuildStatus, InvocationId, MessageSid, NotifierError, OutboundSms,
    PhoneNumber, RepoName, SecretName, SecretStore, SecretValue, SmsCredentials, SmsGateway,
};

/// Placeholder used in diagnostics when the event names no repository.
pub const UNKNOWN_REPO_NAME: &str = "UNKNOWN REPO NAME";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Names of the four secrets read before every send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsSecretNames {
    /// Secret holding the provider account SID.
    pub account_sid: String,
    /// Secret holding the provider auth token.
    pub auth_token: String,
    /// Secret holding the sending phone number.
    pub from_number: String,
    /// Secret holding the recipient phone number.
    pub to_number: String,
}

impl Default for SmsSecretNames {
    fn default() -> Self {
        Self {
            account_sid: "twilio-acct-sid".to_string(),
            auth_token: "twilio-acct-token".to_string(),
            from_number: "twilio-phone-from".to_string(),
            to_number: "twilio-phone-to".to_string(),
        }
    }
}

/// Validated form of [`SmsSecretNames`].
#[derive(Debug, Clone)]
struct ResolvedSecretNames {
    account_sid: SecretName,
    auth_token: SecretName,
    from_number: SecretName,
    to_number: SecretName,
}

impl SmsSecretNames {
    /// Returns the first field that is empty, if any.
    pub fn first_empty(&self) -> Option<&'static str> {
        [
            ("account_sid", &self.account_sid),
            ("auth_token", &self.auth_token),
            ("from_number", &self.from_number),
            ("to_number", &self.to_number),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }

    fn resolve(&self) -> Option<ResolvedSecretNames> {
        Some(ResolvedSecretNames {
            account_sid: SecretName::new(self.account_sid.trim())?,
            auth_token: SecretName::new(self.auth_token.trim())?,
            from_number: SecretName::new(self.from_number.trim())?,
            to_number: SecretName::new(self.to_number.trim())?,
        })
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Terminal result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    /// `SUCCESS`
    Succeeded,
    /// `FAILURE`
    Failed,
}

/// A notification that is due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// How the build ended.
    pub result: BuildResult,
    /// Repository the build ran for.
    pub repo: RepoName,
}

impl Notification {
    /// Returns the message text sent to the recipient.
    pub fn body(&self) -> String {
        match self.result {
            BuildResult::Succeeded => format!("Build SUCCESS for: {}", self.repo),
            BuildResult::Failed => format!("Build FAILED for: {}", self.repo),
        }
    }
}

/// Why a build event produced no notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// The event has no `status` field.
    MissingStatus,
    /// The build ended but the event does not name the repository.
    MissingRepoName,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingStatus => f.write_str("missing status"),
            Self::MissingRepoName => f.write_str("missing REPO_NAME"),
        }
    }
}

/// What to do with one build event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Send the notification.
    Notify(Notification),
    /// Do nothing; the event is incomplete.
    Suppress(SuppressReason),
    /// Do nothing; the build has not finished.
    Interim {
        /// Raw status string.
        status: String,
    },
}

/// Classifies a build event.
///
/// Missing `status`, or a terminal status without a repository name, is
/// suppressed rather than sent with a placeholder.
pub fn decide(event: &BuildEvent) -> Decision {
    let Some(status) = event.status() else {
        return Decision::Suppress(SuppressReason::MissingStatus);
    };

    let result = match status {
        BuildStatus::Success => BuildResult::Succeeded,
        BuildStatus::Failure => BuildResult::Failed,
        BuildStatus::Interim(status) => return Decision::Interim { status },
    };

    match event.repo_name() {
        Some(repo) => Decision::Notify(Notification { result, repo }),
        None => Decision::Suppress(SuppressReason::MissingRepoName),
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Terminal state reached by one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A notification was sent and accepted by the provider.
    Notified {
        /// Identifier the provider assigned to the message.
        message_sid: MessageSid,
    },
    /// The event was incomplete; nothing was sent.
    Suppressed {
        /// What was missing.
        reason: SuppressReason,
    },
    /// The build has not finished; nothing was sent.
    Interim {
        /// Raw status string.
        status: String,
    },
}

/// Handles build events end to end.
///
/// Holds only shared, immutable collaborators, so one instance serves any
/// number of concurrent invocations.
#[derive(Clone)]
pub struct Dispatcher {
    secrets: Arc<dyn SecretStore>,
    sms: Arc<dyn SmsGateway>,
    names: ResolvedSecretNames,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// Returns `None` if any of the secret names is empty.
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        sms: Arc<dyn SmsGateway>,
        names: &SmsSecretNames,
    ) -> Option<Self> {
        Some(Self {
            secrets,
            sms,
            names: names.resolve()?,
        })
    }

    /// Decodes base64 message data and dispatches the build event it holds.
    ///
    /// Decoding failures, secret-store failures and send failures are all
    /// returned; none is retried here.
    #[instrument(name = "dispatch", skip_all, fields(invocation = %InvocationId::new_random()))]
    pub async fn handle(&self, encoded: &[u8]) -> Result<DispatchOutcome, NotifierError> {
        let event = BuildEvent::decode(encoded)?;
        self.dispatch(&event).await
    }

    /// Dispatches an already decoded build event.
    pub async fn dispatch(&self, event: &BuildEvent) -> Result<DispatchOutcome, NotifierError> {
        match decide(event) {
            Decision::Notify(notification) => {
                let message_sid = self.send(&notification.body()).await?;
                Ok(DispatchOutcome::Notified { message_sid })
            }
            Decision::Suppress(reason) => {
                match reason {
                    SuppressReason::MissingStatus => debug!("Message is missing the status"),
                    SuppressReason::MissingRepoName => debug!(
                        status = event.status.as_deref().unwrap_or_default(),
                        "Received a terminal build message but missing REPO_NAME in the message"
                    ),
                }
                Ok(DispatchOutcome::Suppressed { reason })
            }
            Decision::Interim { status } => {
                let repo = event
                    .repo_name()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| UNKNOWN_REPO_NAME.to_string());
                debug!("Interim status received: {status} for {repo}");
                Ok(DispatchOutcome::Interim { status })
            }
        }
    }

    async fn send(&self, body: &str) -> Result<MessageSid, NotifierError> {
        let account_sid = self.read(&self.names.account_sid).await?;
        let auth_token = self.read(&self.names.auth_token).await?;
        let credentials = SmsCredentials {
            account_sid: AccountSid::new(account_sid)
                .ok_or_else(|| self.invalid(&self.names.account_sid))?,
            auth_token: SecretValue::new(auth_token),
        };

        let from = self.read(&self.names.from_number).await?;
        let to = self.read(&self.names.to_number).await?;
        let message = OutboundSms {
            from: PhoneNumber::new(from)
                .ok_or_else(|| self.invalid(&self.names.from_number))?,
            to: PhoneNumber::new(to).ok_or_else(|| self.invalid(&self.names.to_number))?,
            body: body.to_string(),
        };

        let message_sid = self.sms.send(&credentials, &message).await?;
        info!(%message_sid, body, "Message sent");
        Ok(message_sid)
    }

    fn invalid(&self, name: &SecretName) -> NotifierError {
        NotifierError::InvalidSecret { name: name.clone() }
    }

    /// Reads the latest version of `name` as trimmed, non-empty text.
    async fn read(&self, name: &SecretName) -> Result<String, NotifierError> {
        let value = self
            .secrets
            .access_latest(name)
            .await
            .map_err(|source| NotifierError::SecretStore {
                name: name.clone(),
                source,
            })?;
        value
            .trimmed()
            .map(str::to_string)
            .ok_or_else(|| self.invalid(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemorySecretStore, RecordingSmsGateway};
    use crate::{SecretStoreError, SmsError};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn event(json: &str) -> BuildEvent {
        BuildEvent::from_json(json).expect("valid event")
    }

    fn dispatcher(
        store: MemorySecretStore,
    ) -> (Dispatcher, Arc<MemorySecretStore>, Arc<RecordingSmsGateway>) {
        let store = Arc::new(store);
        let gateway = Arc::new(RecordingSmsGateway::new());
        let dispatcher = Dispatcher::new(store.clone(), gateway.clone(), &SmsSecretNames::default())
            .expect("default names are valid");
        (dispatcher, store, gateway)
    }

    #[test]
    fn decide_success_with_repo() {
        let decision = decide(&event(
            r#"{"status":"SUCCESS","substitutions":{"REPO_NAME":"api"}}"#,
        ));
        let Decision::Notify(n) = decision else {
            panic!("expected notify, got {decision:?}");
        };
        assert_eq!(n.body(), "Build SUCCESS for: api");
    }

    #[test]
    fn decide_failure_with_repo() {
        let decision = decide(&event(
            r#"{"status":"FAILURE","substitutions":{"REPO_NAME":"web"}}"#,
        ));
        let Decision::Notify(n) = decision else {
            panic!("expected notify, got {decision:?}");
        };
        assert_eq!(n.body(), "Build FAILED for: web");
    }

    #[test]
    fn decide_suppresses_incomplete_events() {
        assert_eq!(
            decide(&event(r#"{"substitutions":{"REPO_NAME":"api"}}"#)),
            Decision::Suppress(SuppressReason::MissingStatus)
        );
        assert_eq!(
            decide(&event(r#"{"status":"SUCCESS"}"#)),
            Decision::Suppress(SuppressReason::MissingRepoName)
        );
        assert_eq!(
            decide(&event(r#"{"status":"FAILURE","substitutions":{}}"#)),
            Decision::Suppress(SuppressReason::MissingRepoName)
        );
    }

    #[test]
    fn decide_interim() {
        assert_eq!(
            decide(&event(r#"{"status":"WORKING"}"#)),
            Decision::Interim {
                status: "WORKING".to_string()
            }
        );
    }

    #[test]
    fn secret_names_must_be_non_empty() {
        let names = SmsSecretNames {
            to_number: " ".to_string(),
            ..SmsSecretNames::default()
        };
        assert_eq!(names.first_empty(), Some("to_number"));
        let store: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());
        let gateway: Arc<dyn SmsGateway> = Arc::new(RecordingSmsGateway::new());
        assert!(Dispatcher::new(store, gateway, &names).is_none());
    }

    #[tokio::test]
    async fn success_sends_one_message_with_trimmed_secrets() {
        let (dispatcher, store, gateway) = dispatcher(MemorySecretStore::twilio_defaults());

        let encoded =
            STANDARD.encode(r#"{"status":"SUCCESS","substitutions":{"REPO_NAME":"api"}}"#);
        let outcome = dispatcher.handle(encoded.as_bytes()).await.expect("handled");

        assert!(matches!(outcome, DispatchOutcome::Notified { .. }));
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.body, "Build SUCCESS for: api");
        assert_eq!(sent[0].message.from.as_str(), "+15550001111");
        assert_eq!(sent[0].message.to.as_str(), "+15550002222");
        assert_eq!(sent[0].account_sid.as_str(), "AC123");
        assert_eq!(sent[0].auth_token, "token-abc");
        assert_eq!(
            store.accessed(),
            vec![
                "twilio-acct-sid",
                "twilio-acct-token",
                "twilio-phone-from",
                "twilio-phone-to"
            ]
        );
    }

    #[tokio::test]
    async fn failure_sends_failed_wording() {
        let (dispatcher, _, gateway) = dispatcher(MemorySecretStore::twilio_defaults());

        let outcome = dispatcher
            .dispatch(&event(
                r#"{"status":"FAILURE","substitutions":{"REPO_NAME":"web"}}"#,
            ))
            .await
            .expect("handled");

        assert!(matches!(outcome, DispatchOutcome::Notified { .. }));
        assert_eq!(gateway.bodies(), vec!["Build FAILED for: web".to_string()]);
    }

    #[tokio::test]
    async fn nothing_is_read_or_sent_without_a_notification() {
        let (dispatcher, store, gateway) = dispatcher(MemorySecretStore::twilio_defaults());

        for json in [
            r#"{"status":"SUCCESS"}"#,
            r#"{"status":"WORKING","substitutions":{"REPO_NAME":"api"}}"#,
            r#"{"id":"b-1"}"#,
        ] {
            dispatcher.dispatch(&event(json)).await.expect("handled");
        }

        assert!(gateway.sent().is_empty());
        assert!(store.accessed().is_empty());
    }

    #[tokio::test]
    async fn non_base64_input_fails() {
        let (dispatcher, _, gateway) = dispatcher(MemorySecretStore::twilio_defaults());

        let err = dispatcher.handle(b"%%%").await.unwrap_err();

        assert!(matches!(err, NotifierError::Decode(_)));
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn secret_store_failure_prevents_send() {
        let store = MemorySecretStore::twilio_defaults().failing_with(|name| {
            SecretStoreError::PermissionDenied { name: name.clone() }
        });
        let (dispatcher, _, gateway) = dispatcher(store);

        let err = dispatcher
            .dispatch(&event(
                r#"{"status":"SUCCESS","substitutions":{"REPO_NAME":"api"}}"#,
            ))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NotifierError::SecretStore {
                source: SecretStoreError::PermissionDenied { .. },
                ..
            }
        ));
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn blank_secret_is_rejected() {
        let store = MemorySecretStore::twilio_defaults().with_secret("twilio-phone-to", "\n");
        let (dispatcher, _, gateway) = dispatcher(store);

        let err = dispatcher
            .dispatch(&event(
                r#"{"status":"SUCCESS","substitutions":{"REPO_NAME":"api"}}"#,
            ))
            .await
            .unwrap_err();

        match err {
            NotifierError::InvalidSecret { name } => assert_eq!(name.as_str(), "twilio-phone-to"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_propagates() {
        let store = Arc::new(MemorySecretStore::twilio_defaults());
        let gateway = Arc::new(RecordingSmsGateway::failing(|| SmsError::Unavailable {
            status: 503,
            message: "try later".into(),
            retry_after: None,
        }));
        let dispatcher =
            Dispatcher::new(store, gateway, &SmsSecretNames::default()).expect("valid names");

        let err = dispatcher
            .dispatch(&event(
                r#"{"status":"FAILURE","substitutions":{"REPO_NAME":"api"}}"#,
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, NotifierError::Sms(SmsError::Unavailable { .. })));
        assert!(err.retry_policy().is_retryable());
    }
}
