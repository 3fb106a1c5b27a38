//! Chat relay core and its HTTP adapter.
//!
//! [`relay_chat`] is the whole request pipeline: key check, request
//! translation, endpoint resolution, and the upstream relay. The axum
//! handlers in this module are a thin layer over it; any other deployment
//! adapter can call it the same way.

pub mod endpoint;
mod handlers;
pub mod relay;
mod server;
pub mod stream;
pub mod types;
pub mod upstream;

pub use relay::ProxyResponse;
pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use stream::RelayBody;
pub use types::{translate, ChatReply, UpstreamRequestBody};
pub use upstream::{HttpTransport, Transport, TransportError, UpstreamRequest, UpstreamResponse};

use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::Result;

/// Relay one inbound chat request to the configured provider.
///
/// Fails fast, without any network call, on a missing API key, an invalid
/// body or an unresolvable base URL. `cancel` should fire when the inbound
/// connection goes away.
pub async fn relay_chat(
    provider: &ProviderConfig,
    transport: &dyn Transport,
    raw_body: &[u8],
    cancel: CancellationToken,
) -> Result<ProxyResponse> {
    let api_key = provider.api_key()?;
    let body = translate(raw_body, &provider.model)?;
    let endpoint = provider.endpoint()?;

    tracing::info!(
        model = %body.model,
        messages = body.messages.len(),
        stream = body.stream,
        endpoint = %endpoint,
        "Relaying chat completion"
    );

    let request = UpstreamRequest {
        endpoint: &endpoint,
        api_key,
        body: &body,
    };
    relay::relay(transport, request, cancel).await
}
