//! Shared helpers for chat-relay integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{Request, StatusCode};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use chat_relay::config::{ApiKey, Config, ProviderConfig, ServerConfig};
use chat_relay::proxy::{
    create_router, AppState, Transport, TransportError, UpstreamRequest, UpstreamResponse,
};

/// Build a config pointing at `url`, with an optional API key.
pub fn test_config(url: &str, api_key: Option<&str>) -> Config {
    Config {
        server: ServerConfig {
            listen: "127.0.0.1:0".to_string(),
        },
        provider: ProviderConfig {
            url: url.to_string(),
            model: "deepseek-chat".to_string(),
            api_key: api_key.map(ApiKey::from),
        },
    }
}

/// Build the relay router over an arbitrary transport.
pub fn test_app(config: Config, transport: Arc<dyn Transport>) -> axum::Router {
    create_router(AppState {
        config: Arc::new(config),
        transport,
    })
}

/// POST a JSON body to /api/chat.
pub fn chat_request(body: &serde_json::Value) -> Request<Body> {
    Request::post("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send one request through the router.
pub async fn send(app: axum::Router, request: Request<Body>) -> axum::response::Response {
    app.oneshot(request).await.unwrap()
}

/// Parse the response body as JSON and return (status_code, json_value).
pub async fn parse_body(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, json)
}

/// Read the whole response body as text.
pub async fn body_text(response: axum::response::Response) -> String {
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    String::from_utf8(body_bytes.to_vec()).expect("utf-8 body")
}

/// How the mock upstream behaves once called.
pub enum MockBehavior {
    /// Answer with an SSE body fed by the returned sender.
    Stream,
    /// Never answer; wait for cancellation.
    Hang,
}

/// In-memory transport that records calls and the cancellation token it
/// was handed.
pub struct MockTransport {
    behavior: MockBehavior,
    calls: AtomicUsize,
    cancel: Mutex<Option<CancellationToken>>,
    stream_rx: Mutex<Option<mpsc::Receiver<Result<Bytes, TransportError>>>>,
    pub called: Notify,
}

impl MockTransport {
    /// A transport streaming whatever is sent on the returned sender.
    pub fn streaming() -> (Arc<Self>, mpsc::Sender<Result<Bytes, TransportError>>) {
        let (tx, rx) = mpsc::channel(8);
        let transport = Self {
            behavior: MockBehavior::Stream,
            calls: AtomicUsize::new(0),
            cancel: Mutex::new(None),
            stream_rx: Mutex::new(Some(rx)),
            called: Notify::new(),
        };
        (Arc::new(transport), tx)
    }

    /// A transport that never answers.
    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            behavior: MockBehavior::Hang,
            calls: AtomicUsize::new(0),
            cancel: Mutex::new(None),
            stream_rx: Mutex::new(None),
            called: Notify::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The token passed to the last call.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap()
            .clone()
            .expect("transport was never called")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        _request: UpstreamRequest<'_>,
        cancel: CancellationToken,
    ) -> Result<UpstreamResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.cancel.lock().unwrap() = Some(cancel.clone());
        self.called.notify_one();

        match self.behavior {
            MockBehavior::Stream => {
                let rx = self
                    .stream_rx
                    .lock()
                    .unwrap()
                    .take()
                    .expect("streaming mock called twice");
                Ok(UpstreamResponse {
                    status: StatusCode::OK,
                    content_type: Some("text/event-stream".to_string()),
                    body: Some(Box::pin(ReceiverStream::new(rx))),
                })
            }
            MockBehavior::Hang => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        }
    }
}
