use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;
use whisperlock_core::protocol::OkResponse;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("push key error: {0}")]
    Key(String),

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(OkResponse { ok: false })).into_response()
    }
}

/// Delivery to one subscription failed. The subscription is pruned; nothing
/// else is affected.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid subscription {endpoint}: {reason}")]
    InvalidSubscription { endpoint: String, reason: String },

    #[error("push client setup failed: {0}")]
    Client(String),
}
