//! Build notifier entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load the TOML file named by `--config` (or
//!    `build-notifier.toml` when present), apply environment overrides and
//!    validate the result.
//! 2. **Wire observability**: configure `tracing-subscriber` with a text or
//!    JSON layer and, when an endpoint is configured, an OpenTelemetry OTLP
//!    exporter. All `tracing` spans and events emitted by every crate in the
//!    workspace flow through this subscriber.
//! 3. **Construct infrastructure**: create the `SecretManagerClient` and
//!    `TwilioClient` adapters and inject them into a [`notifier::Dispatcher`].
//! 4. **Select the command**:
//!    - `serve` (default): bind the Pub/Sub push listener and run until
//!      Ctrl-C or SIGTERM.
//!    - `dispatch <DATA>`: handle one base64-encoded build event (`-` reads it
//!      from stdin) and print the outcome.

mod config;
mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gcp::{MetadataClient, SecretManagerClient, TokenSource};
use listener::PushListener;
use notifier::{DispatchOutcome, Dispatcher, ProjectId, SecretValue};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::info;
use twilio::TwilioClient;

use crate::config::NotifierConfig;

#[derive(Debug, Parser)]
#[command(name = "build-notifier", version, about = "Texts build results from Cloud Build events")]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, env = "BUILD_NOTIFIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Receive Pub/Sub push deliveries over HTTP.
    Serve {
        /// Overrides `server.port` and `PORT`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Handle a single base64-encoded build event.
    Dispatch {
        /// Encoded event, or `-` to read it from stdin.
        data: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config =
        NotifierConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let telemetry = telemetry::init(&config.telemetry)?;

    let result = run(cli.command, &mut config).await;
    telemetry.shutdown();
    result
}

async fn run(command: Option<Command>, config: &mut NotifierConfig) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(config).await?;

    match command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr = SocketAddr::new(config.server.host, config.server.port);
            let listener = PushListener::bind(addr).await?;
            listener.serve(dispatcher, shutdown_signal()).await?;
            info!("Shut down gracefully");
        }
        Command::Dispatch { data } => {
            let data = if data == "-" {
                let mut buf = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buf)
                    .await
                    .context("failed to read event from stdin")?;
                buf
            } else {
                data
            };
            let outcome = dispatcher.handle(data.as_bytes()).await?;
            println!("{}", describe(&outcome));
        }
    }
    Ok(())
}

async fn build_dispatcher(config: &NotifierConfig) -> anyhow::Result<Dispatcher> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let metadata = MetadataClient::new(http.clone(), config.gcp.metadata_url.clone());

    let project = match config.gcp.project_id.as_deref().and_then(ProjectId::new) {
        Some(project) => project,
        None => metadata
            .project_id()
            .await
            .context("project id is not configured and the metadata server did not provide one")?,
    };
    info!(%project, "Reading SMS secrets from Secret Manager");

    let tokens = match &config.gcp.access_token {
        Some(token) => TokenSource::Static(SecretValue::new(token.clone())),
        None => TokenSource::Metadata(metadata),
    };
    let secrets = SecretManagerClient::new(http.clone(), project, tokens)
        .with_base_url(config.gcp.secret_manager_url.clone());
    let sms = TwilioClient::new(http).with_base_url(config.twilio.base_url.clone());

    Dispatcher::new(Arc::new(secrets), Arc::new(sms), &config.secrets)
        .context("secret names must not be empty")
}

fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Notified { message_sid } => format!("sent {message_sid}"),
        DispatchOutcome::Suppressed { reason } => format!("suppressed: {reason}"),
        DispatchOutcome::Interim { status } => format!("interim status {status}, nothing sent"),
    }
}

async fn shutdown_signal() {
    let result = wait_for_signal().await;
    if let Err(err) = result {
        tracing::error!("failed to listen for shutdown signal: {err}");
    }
    info!("Shutdown signal received");
}

async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await
    }
}
