//! Where Secret Manager bearer tokens come from.

use notifier::SecretValue;

use crate::{MetadataClient, MetadataError};

/// Source of the bearer token sent with each Secret Manager request.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A fixed token, e.g. from `gcloud auth print-access-token` during local
    /// runs.
    Static(SecretValue),
    /// Fetched from the metadata server for every request. The server caches
    /// and refreshes the token itself.
    Metadata(MetadataClient),
}

impl TokenSource {
    /// Returns a token valid for the next request.
    pub async fn token(&self) -> Result<SecretValue, MetadataError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata(client) => Ok(client.access_token().await?.token),
        }
    }
}
