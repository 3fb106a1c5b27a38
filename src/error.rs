//! Error types for chat-relay.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::proxy::upstream::TransportError;

/// Result type alias for chat-relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chat-relay.
///
/// Every variant is raised before the response status is committed, so each
/// maps to a complete JSON error response. Failures after a stream has
/// started are reported in-band instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    Validation(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamTransport(#[from] TransportError),

    #[error("{message}")]
    UpstreamStatus {
        status: StatusCode,
        message: String,
        raw: serde_json::Value,
    },

    #[error("Upstream returned no choices[0].message.content")]
    UpstreamShape { raw: serde_json::Value },
}

impl Error {
    /// HTTP status reported to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamTransport(_)
            | Error::UpstreamStatus { .. }
            | Error::UpstreamShape { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Upstream body kept for diagnostics, when there is one.
    pub fn raw(&self) -> Option<&serde_json::Value> {
        match self {
            Error::UpstreamStatus { raw, .. } | Error::UpstreamShape { raw } => Some(raw),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Some(raw) = self.raw() {
            body["raw"] = raw.clone();
        }

        (
            status,
            [
                (header::CONTENT_TYPE, "application/json; charset=utf-8"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            body.to_string(),
        )
            .into_response()
    }
}
