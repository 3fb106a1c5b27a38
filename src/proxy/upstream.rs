//! The upstream transport seam.
//!
//! The relay talks to the provider through [`Transport`] so the HTTP client
//! can be swapped for a scripted one in tests. [`HttpTransport`] is the
//! reqwest-backed implementation used by the server.

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::types::UpstreamRequestBody;
use crate::config::ApiKey;

/// Byte chunks of an upstream body, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Failure to reach the upstream or to read its body.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("request cancelled: client disconnected")]
    Cancelled,

    #[error("{0}")]
    Io(String),
}

/// One upstream call: where, with which key, carrying what.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamRequest<'a> {
    pub endpoint: &'a str,
    pub api_key: &'a ApiKey,
    pub body: &'a UpstreamRequestBody,
}

/// Status line, content type and body of an upstream response.
///
/// `body` is `None` when the response carries no body at all.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Option<ByteStream>,
}

impl UpstreamResponse {
    /// Whether the upstream declared an SSE body.
    pub fn is_event_stream(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/event-stream"))
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Issues a single upstream chat-completions call.
///
/// Implementations must give up as soon as `cancel` fires. They must not
/// retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: UpstreamRequest<'_>,
        cancel: CancellationToken,
    ) -> Result<UpstreamResponse, TransportError>;
}

/// Statuses whose responses never carry a body.
fn is_null_body_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
    )
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with a connect timeout and no overall timeout, so
    /// long streams are never cut off locally.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: UpstreamRequest<'_>,
        cancel: CancellationToken,
    ) -> Result<UpstreamResponse, TransportError> {
        let pending = self
            .client
            .post(request.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(request.api_key.expose_secret())
            .json(request.body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            response = pending => response?,
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = if is_null_body_status(status) {
            None
        } else {
            Some(response.bytes_stream().map_err(TransportError::from).boxed())
        };

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Read a whole body into memory, giving up if `cancel` fires.
pub async fn read_body(
    body: Option<ByteStream>,
    cancel: &CancellationToken,
) -> Result<Bytes, TransportError> {
    let Some(mut body) = body else {
        return Ok(Bytes::new());
    };

    let mut buffer = Vec::new();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            next = body.next() => next,
        };
        match next {
            Some(chunk) => buffer.extend_from_slice(&chunk?),
            None => return Ok(Bytes::from(buffer)),
        }
    }
}

/// Parse a body as JSON, substituting `{}` for anything that is not JSON.
pub fn parse_json_lenient(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap_or_else(|_| serde_json::json!({}))
}
