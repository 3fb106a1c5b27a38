//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use super::upstream::{HttpTransport, Transport};
use crate::config::Config;

/// Response header carrying the per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation ID assigned to every inbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transport: Arc<dyn Transport>,
}

impl AppState {
    pub fn new(config: Config, transport: impl Transport + 'static) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
        }
    }
}

/// Attach a fresh [`RequestId`] to the request and echo it on the response.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(request_id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat).fallback(handlers::method_not_allowed))
        .route(
            "/api/config",
            get(handlers::public_config).fallback(handlers::not_found),
        )
        .route(
            "/config",
            get(handlers::public_config).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen.clone();

    match config.provider.endpoint() {
        Ok(endpoint) => tracing::info!(
            endpoint = %endpoint,
            model = %config.provider.model,
            "Upstream configured"
        ),
        Err(e) => tracing::warn!(error = %e, "Upstream base URL is invalid; chat requests will fail"),
    }

    let transport = HttpTransport::new()?;
    let app = create_router(AppState::new(config, transport));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting chat-relay server");

    axum::serve(listener, app).await?;

    Ok(())
}
