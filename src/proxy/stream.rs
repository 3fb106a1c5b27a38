//! SSE framing and the outbound streaming body.
//!
//! [`RelayBody`] is what the caller reads in streaming mode. It is either a
//! short, fixed sequence of synthesized frames or a live byte-for-byte
//! forward of the upstream event stream. A live body owns a drop guard on
//! the request's cancellation token, so a caller that goes away before the
//! end cancels the upstream read.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::upstream::ByteStream;

/// Terminal frame of every outbound event stream.
pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

/// Chunks buffered between the forwarding loop and the response writer.
const FORWARD_BUFFER: usize = 16;

pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME)
}

/// A streaming-shaped frame carrying one content delta.
pub fn delta_frame(content: &str) -> Bytes {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    Bytes::from(format!("data: {}\n\n", payload))
}

/// In-band error frame for failures after headers were sent.
pub fn error_frame(message: &str) -> Bytes {
    let payload = serde_json::json!({ "error": message });
    Bytes::from(format!("data: {}\n\n", payload))
}

/// Outbound SSE body.
pub struct RelayBody {
    inner: ReceiverStream<Bytes>,
    guard: Option<DropGuard>,
}

impl RelayBody {
    /// A body made of fixed frames, e.g. a synthesized delta and `[DONE]`.
    pub fn from_frames(frames: Vec<Bytes>) -> Self {
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            // Capacity matches the frame count.
            let _ = tx.try_send(frame);
        }
        Self {
            inner: ReceiverStream::new(rx),
            guard: None,
        }
    }

    /// Forward `upstream` verbatim, chunk by chunk, in arrival order.
    ///
    /// Spawns the forwarding loop. Dropping the body before it has ended
    /// cancels `cancel`, which stops the loop and drops the upstream stream.
    pub fn forward(upstream: ByteStream, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        tokio::spawn(forward_loop(upstream, tx, cancel.clone()));
        Self {
            inner: ReceiverStream::new(rx),
            guard: Some(cancel.drop_guard()),
        }
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => {
                // Natural end: the caller got everything, nothing to cancel.
                if let Some(guard) = this.guard.take() {
                    guard.disarm();
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

async fn forward_loop(
    mut upstream: ByteStream,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    let mut forwarded = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(bytes = forwarded, "Client disconnected, dropping upstream stream");
                return;
            }
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                forwarded += chunk.len();
                if tx.send(chunk).await.is_err() {
                    tracing::debug!(bytes = forwarded, "Outbound body closed, cancelling upstream");
                    cancel.cancel();
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, bytes = forwarded, "Upstream stream failed mid-response");
                let _ = tx.send(error_frame(&e.to_string())).await;
                let _ = tx.send(done_frame()).await;
                return;
            }
            None => {
                tracing::debug!(bytes = forwarded, "Upstream stream finished");
                return;
            }
        }
    }
}
