//! Response relay: one upstream call, then buffered or streaming handling.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::sync::CancellationToken;

use super::stream::{delta_frame, done_frame, error_frame, RelayBody};
use super::types::{message_content, upstream_error_message, ChatReply};
use super::upstream::{parse_json_lenient, read_body, Transport, UpstreamRequest, UpstreamResponse};
use crate::error::Error;

/// What the caller receives once the upstream call has succeeded.
pub enum ProxyResponse {
    Buffered(ChatReply),
    Stream(RelayBody),
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        match self {
            ProxyResponse::Buffered(reply) => {
                let mut response = Json(reply).into_response();
                let headers = response.headers_mut();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json; charset=utf-8"),
                );
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                response
            }
            ProxyResponse::Stream(body) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-store"),
                    (header::CONNECTION, "keep-alive"),
                    // Keeps nginx-style proxies from batching frames.
                    (header::HeaderName::from_static("x-accel-buffering"), "no"),
                ],
                Body::from_stream(body),
            )
                .into_response(),
        }
    }
}

/// Issue the upstream call and shape its result for the caller.
///
/// Exactly one call is made. Every error returned here happens before any
/// outbound byte; failures after that point are reported inside the stream.
pub async fn relay(
    transport: &dyn Transport,
    request: UpstreamRequest<'_>,
    cancel: CancellationToken,
) -> Result<ProxyResponse, Error> {
    let streaming = request.body.stream;

    let response = transport
        .send(request, cancel.clone())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, endpoint = %request.endpoint, "Failed to reach upstream");
            Error::UpstreamTransport(e)
        })?;

    if !response.status.is_success() {
        return Err(status_error(response, &cancel).await);
    }

    if streaming {
        Ok(ProxyResponse::Stream(relay_stream(response, cancel).await))
    } else {
        relay_buffered(response, &cancel).await.map(ProxyResponse::Buffered)
    }
}

/// Build an [`Error::UpstreamStatus`] from a failed response.
///
/// The body is read tolerantly: an unreadable or non-JSON body becomes `{}`.
async fn status_error(response: UpstreamResponse, cancel: &CancellationToken) -> Error {
    let status = response.status;
    let raw = match read_body(response.body, cancel).await {
        Ok(bytes) => parse_json_lenient(&bytes),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read upstream error body");
            serde_json::json!({})
        }
    };
    let message = upstream_error_message(&raw, status.as_u16());
    tracing::error!(status = %status, message = %message, "Upstream returned error");

    Error::UpstreamStatus {
        status,
        message,
        raw,
    }
}

async fn relay_buffered(
    response: UpstreamResponse,
    cancel: &CancellationToken,
) -> Result<ChatReply, Error> {
    let bytes = read_body(response.body, cancel).await?;
    let raw = parse_json_lenient(&bytes);

    let content = match message_content(&raw) {
        Some(content) if !content.is_empty() => content.trim().to_string(),
        _ => {
            tracing::error!("Upstream response has no choices[0].message.content");
            return Err(Error::UpstreamShape { raw });
        }
    };

    tracing::debug!(chars = content.len(), "Relayed buffered completion");
    Ok(ChatReply { content })
}

async fn relay_stream(response: UpstreamResponse, cancel: CancellationToken) -> RelayBody {
    let is_event_stream = response.is_event_stream();

    let Some(body) = response.body else {
        tracing::debug!("Upstream sent no body, ending stream");
        return RelayBody::from_frames(vec![done_frame()]);
    };

    if is_event_stream {
        return RelayBody::forward(body, cancel);
    }

    // The provider answered with one JSON object; reshape it into a single
    // delta so callers only consume the streaming format.
    tracing::debug!(
        content_type = ?response.content_type,
        "Upstream ignored stream request, synthesizing frames"
    );
    match read_body(Some(body), &cancel).await {
        Ok(bytes) => {
            let raw = parse_json_lenient(&bytes);
            let mut frames = Vec::with_capacity(2);
            if let Some(content) = message_content(&raw).filter(|c| !c.is_empty()) {
                frames.push(delta_frame(content));
            }
            frames.push(done_frame());
            RelayBody::from_frames(frames)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read non-streaming upstream body");
            RelayBody::from_frames(vec![error_frame(&e.to_string()), done_frame()])
        }
    }
}
