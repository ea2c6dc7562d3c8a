//! HTTP receiver for Pub/Sub push deliveries.

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use notifier::{error_chain, DispatchOutcome, Dispatcher, NotifierError, RetryPolicy};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::PushEnvelope;

/// Failures of the listener itself (not of individual deliveries).
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("push listener failed")]
    Serve(#[source] std::io::Error),
}

/// Builds the router: `POST /` and `POST /pubsub` receive deliveries,
/// `GET /healthz` answers `ok`.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/", post(receive_push))
        .route("/pubsub", post(receive_push))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(dispatcher)
}

/// A bound push listener.
#[derive(Debug)]
pub struct PushListener {
    listener: TcpListener,
}

impl PushListener {
    /// Binds the listening socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        Ok(Self { listener })
    }

    /// Returns the address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves deliveries until `shutdown` completes, then drains in-flight
    /// requests.
    pub async fn serve(
        self,
        dispatcher: Dispatcher,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Push listener: Listening on {addr}");
        }
        axum::serve(self.listener, router(dispatcher))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ListenerError::Serve)
    }
}

async fn receive_push(
    State(dispatcher): State<Dispatcher>,
    envelope: Result<Json<PushEnvelope>, JsonRejection>,
) -> Response {
    let Json(envelope) = match envelope {
        Ok(envelope) => envelope,
        Err(rejection) => {
            warn!("Rejected push delivery: {}", rejection.body_text());
            return rejection.into_response();
        }
    };

    let message = envelope.message;
    let span = info_span!(
        "pubsub_push",
        message_id = tracing::field::Empty,
        subscription = envelope.subscription.as_deref().unwrap_or_default(),
    );
    if let Some(id) = message.id() {
        span.record("message_id", tracing::field::display(&id));
    }

    async move {
        if let Some(published) = message.published_at() {
            debug!(%published, "Push delivery received");
        }
        let Some(data) = message.data else {
            warn!("Push delivery has no message data");
            return (StatusCode::BAD_REQUEST, "message.data is required").into_response();
        };

        match dispatcher.handle(data.as_bytes()).await {
            Ok(outcome) => {
                log_outcome(&outcome);
                StatusCode::NO_CONTENT.into_response()
            }
            Err(err) => error_response(&err),
        }
    }
    .instrument(span)
    .await
}

fn log_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Notified { message_sid } => {
            info!(%message_sid, "Build notification sent")
        }
        DispatchOutcome::Suppressed { reason } => {
            info!(%reason, "Build notification suppressed")
        }
        DispatchOutcome::Interim { status } => debug!(%status, "Build still in progress"),
    }
}

/// Maps a dispatch failure to the status returned to Pub/Sub.
///
/// Every non-2xx answer nacks the message, so Pub/Sub redelivers it under the
/// subscription's retry policy. The body is the error with all its causes.
pub fn error_response(err: &NotifierError) -> Response {
    let report = error_chain(err);
    error!("Build notification failed: {report}");
    match (err, err.retry_policy()) {
        (NotifierError::Decode(_), _) => (StatusCode::BAD_REQUEST, report).into_response(),
        (_, RetryPolicy::Retryable { after }) => {
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, report).into_response();
            if let Some(after) = after {
                if let Ok(value) = HeaderValue::from_str(&after.as_secs().to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
            response
        }
        (_, RetryPolicy::NonRetryable) => (StatusCode::BAD_GATEWAY, report).into_response(),
    }
}
