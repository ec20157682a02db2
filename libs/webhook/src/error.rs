use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Error type returned by admission handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    ReadBody(#[source] axum::Error),

    #[error("failed to decode incoming AdmissionReview: {0}")]
    DecodeReview(#[source] serde_json::Error),

    #[error("failed to decode incoming AdmissionReview: missing request")]
    MissingRequest,

    #[error("failed to execute admission handler: {0}")]
    Handler(#[source] BoxError),

    #[error("failed to marshal admission handler patches: {0}")]
    EncodePatches(#[source] serde_json::Error),

    #[error("failed to marshal outgoing AdmissionReview: {0}")]
    EncodeReview(#[source] serde_json::Error),

    #[error("{0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("{0}: {1}")]
    Tls(String, #[source] rustls::Error),

    #[error("no private key found in {0}")]
    MissingPrivateKey(PathBuf),

    #[error("listener on {0} failed: {1}")]
    Listen(SocketAddr, #[source] std::io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("listener task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("graceful shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("telemetry setup failed: {0}")]
    Telemetry(String),

    #[error("server closed")]
    ServerClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True for the condition returned by a listener stopped through graceful shutdown.
    pub fn is_server_closed(&self) -> bool {
        matches!(self, Error::ServerClosed)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!(error = %self, "failed to handle admission review");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
