//! In-memory fakes for the port traits (testing only)
//!
//! Provides `MemorySecretStore` and `RecordingSmsGateway`, which satisfy the
//! trait contracts without any network access and record every call.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    AccountSid, MessageSid, OutboundSms, SecretName, SecretStore, SecretStoreError, SecretValue,
    SmsCredentials, SmsError, SmsGateway,
};

type SecretFailure = Box<dyn Fn(&SecretName) -> SecretStoreError + Send + Sync>;
type SmsFailure = Box<dyn Fn() -> SmsError + Send + Sync>;

// ---------------------------------------------------------------------------
// MemorySecretStore
// ---------------------------------------------------------------------------

/// In-memory secret store backed by a `HashMap<name, value>`.
///
/// Unknown names produce [`SecretStoreError::NotFound`].
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, String>,
    failure: Option<SecretFailure>,
    accessed: Mutex<Vec<String>>,
}

impl MemorySecretStore {
    /// An empty store; every access fails with `NotFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding the four default Twilio secrets, with the trailing
    /// newlines secrets often carry.
    pub fn twilio_defaults() -> Self {
        Self::new()
            .with_secret("twilio-acct-sid", "AC123\n")
            .with_secret("twilio-acct-token", "token-abc\n")
            .with_secret("twilio-phone-from", "+15550001111\n")
            .with_secret("twilio-phone-to", "+15550002222")
    }

    /// Adds or replaces the value stored under `name`.
    pub fn with_secret(mut self, name: &str, value: &str) -> Self {
        self.secrets.insert(name.to_string(), value.to_string());
        self
    }

    /// Makes every access fail with the error built by `failure`.
    pub fn failing_with(
        mut self,
        failure: impl Fn(&SecretName) -> SecretStoreError + Send + Sync + 'static,
    ) -> Self {
        self.failure = Some(Box::new(failure));
        self
    }

    /// Names accessed so far, in order.
    pub fn accessed(&self) -> Vec<String> {
        self.accessed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn access_latest(&self, name: &SecretName) -> Result<SecretValue, SecretStoreError> {
        self.accessed.lock().unwrap().push(name.to_string());
        if let Some(failure) = &self.failure {
            return Err(failure(name));
        }
        self.secrets
            .get(name.as_str())
            .map(|v| SecretValue::new(v.clone()))
            .ok_or_else(|| SecretStoreError::NotFound { name: name.clone() })
    }
}

// ---------------------------------------------------------------------------
// RecordingSmsGateway
// ---------------------------------------------------------------------------

/// One call recorded by [`RecordingSmsGateway`].
#[derive(Debug, Clone)]
pub struct SentSms {
    /// Account the message was sent from.
    pub account_sid: AccountSid,
    /// Auth token presented with the request, in clear text.
    pub auth_token: String,
    /// The message as submitted.
    pub message: OutboundSms,
}

/// SMS gateway that records messages and answers with `SM0001`, `SM0002`, …
#[derive(Default)]
pub struct RecordingSmsGateway {
    sent: Mutex<Vec<SentSms>>,
    failure: Option<SmsFailure>,
}

impl RecordingSmsGateway {
    /// A gateway that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every send fails with the error built by `failure`.
    /// Failed sends are not recorded.
    pub fn failing(failure: impl Fn() -> SmsError + Send + Sync + 'static) -> Self {
        Self {
            sent: Mutex::default(),
            failure: Some(Box::new(failure)),
        }
    }

    /// Messages accepted so far, in order.
    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().unwrap().clone()
    }

    /// Bodies of the accepted messages, in order.
    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.message.body).collect()
    }
}

#[async_trait]
impl SmsGateway for RecordingSmsGateway {
    async fn send(
        &self,
        credentials: &SmsCredentials,
        message: &OutboundSms,
    ) -> Result<MessageSid, SmsError> {
        if let Some(failure) = &self.failure {
            return Err(failure());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentSms {
            account_sid: credentials.account_sid.clone(),
            auth_token: credentials.auth_token.expose().to_string(),
            message: message.clone(),
        });
        let sid = format!("SM{:04}", sent.len());
        Ok(MessageSid::new(sid).expect("formatted sid is non-empty"))
    }
}
