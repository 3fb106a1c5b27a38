//! HTTP request handlers.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Extension, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::relay::ProxyResponse;
use super::relay_chat;
use super::server::{AppState, RequestId};

/// JSON body with the same headers as relay errors.
fn json_response(status: StatusCode, body: Value) -> Response {
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

/// Handle POST /api/chat
pub async fn chat(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(
                request_id = %request_id.0,
                status = %rejection.status(),
                error = %rejection.body_text(),
                "Chat request body rejected"
            );
            return json_response(
                rejection.status(),
                serde_json::json!({ "error": rejection.body_text() }),
            );
        }
    };

    // Dropped with this future if the client disconnects mid-request.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let result = relay_chat(
        &state.config.provider,
        state.transport.as_ref(),
        &body,
        cancel,
    )
    .await;
    guard.disarm();

    match result {
        Ok(response) => {
            tracing::info!(
                request_id = %request_id.0,
                streaming = matches!(response, ProxyResponse::Stream(_)),
                "Chat request relayed"
            );
            response.into_response()
        }
        Err(e) => {
            tracing::warn!(
                request_id = %request_id.0,
                status = %e.status_code(),
                error = %e,
                "Chat request failed"
            );
            e.into_response()
        }
    }
}

/// Handle GET /api/config and /config
pub async fn public_config(State(state): State<AppState>) -> Response {
    let provider = &state.config.provider;
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "provider": "deepseek",
            "url": provider.url,
            "model": provider.model,
            "mode": "proxy",
        }),
    )
}

/// Any method other than POST on /api/chat
pub async fn method_not_allowed() -> Response {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        serde_json::json!({ "error": "Method Not Allowed" }),
    )
}

/// Unmatched routes and methods
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
