//! Google Cloud infrastructure adapter for the build notifier.
//!
//! Implements the [`notifier::SecretStore`] trait on top of the Secret
//! Manager REST API, and provides the metadata-server client used to
//! discover the project id and obtain service-account access tokens.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain notification rules.
//! Resource naming, authentication, response decoding and HTTP status mapping
//! are handled here; the [`notifier`] crate sees only
//! [`notifier::SecretStore`] and [`notifier::SecretStoreError`].

pub mod metadata;
pub mod secret_manager;
pub mod token;

pub use metadata::{AccessToken, MetadataClient, MetadataError, DEFAULT_METADATA_URL};
pub use secret_manager::{SecretManagerClient, DEFAULT_SECRET_MANAGER_URL, LATEST_VERSION};
pub use token::TokenSource;
