//! Runtime configuration.
//!
//! Loaded from an optional TOML file, then overridden by the environment
//! variables hosting platforms set (`PORT`, `GOOGLE_CLOUD_PROJECT`) and by
//! `GCP_ACCESS_TOKEN` for local runs. Every field has a default, so an empty
//! file (or none at all) is a valid deployment on Google Cloud.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use gcp::{DEFAULT_METADATA_URL, DEFAULT_SECRET_MANAGER_URL};
use notifier::SmsSecretNames;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use twilio::DEFAULT_TWILIO_URL;

/// File read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "build-notifier.toml";

/// Default filter directive: debug diagnostics from the workspace crates,
/// `info` from everything else.
pub const DEFAULT_LOG_LEVEL: &str = "info,notifier=debug,listener=debug,gcp=debug,twilio=debug";

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`NotifierConfig`].
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is present but unusable.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong and where.
        message: String,
    },
}

/// Complete runtime configuration, one TOML table per field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifierConfig {
    /// `[server]`: push listener address.
    pub server: ServerConfig,
    /// `[secrets]`: names of the four SMS secrets.
    pub secrets: SmsSecretNames,
    /// `[gcp]`: project, credentials and endpoints.
    pub gcp: GcpConfig,
    /// `[twilio]`: Messages API endpoint.
    pub twilio: TwilioConfig,
    /// `[http]`: outbound client settings.
    pub http: HttpConfig,
    /// `[telemetry]`: logging and span export.
    pub telemetry: TelemetryConfig,
}

/// Address the push listener binds to.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface address; all interfaces by default.
    pub host: IpAddr,
    /// TCP port, `8080` by default. `PORT` overrides it.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

/// Google Cloud project and endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GcpConfig {
    /// Project owning the secrets. Looked up on the metadata server if unset.
    pub project_id: Option<String>,
    /// Fixed bearer token. Fetched from the metadata server if unset.
    pub access_token: Option<String>,
    /// Metadata server base URL.
    pub metadata_url: String,
    /// Secret Manager API base URL.
    pub secret_manager_url: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            access_token: None,
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            secret_manager_url: DEFAULT_SECRET_MANAGER_URL.to_string(),
        }
    }
}

/// SMS provider endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TwilioConfig {
    /// Twilio REST API base URL.
    pub base_url: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TWILIO_URL.to_string(),
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Per-request timeout for every outbound call.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Console log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging and span export settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Console format.
    pub log_format: LogFormat,
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// OTLP/gRPC collector endpoint. Span export is off when unset.
    pub otlp_endpoint: Option<String>,
    /// `service.name` resource attribute of exported spans.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            otlp_endpoint: None,
            service_name: "build-notifier".to_string(),
        }
    }
}

impl NotifierConfig {
    /// Loads configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] when
    /// it exists, or falls back to defaults; then applies the process
    /// environment and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses `path` without applying the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses TOML text; missing tables and keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                message: format!("PORT is not a port number: {port:?}"),
            })?;
        }
        if let Some(project) = lookup("GOOGLE_CLOUD_PROJECT").filter(|p| !p.trim().is_empty()) {
            self.gcp.project_id = Some(project.trim().to_string());
        }
        if let Some(token) = lookup("GCP_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.gcp.access_token = Some(token.trim().to_string());
        }
        Ok(())
    }

    /// Rejects empty secret names, port `0` and a zero request timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(field) = self.secrets.first_empty() {
            return Err(ConfigError::Invalid {
                message: format!("secrets.{field} must not be empty"),
            });
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid {
                message: "server.port must not be 0".to_string(),
            });
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "http.timeout_secs must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
