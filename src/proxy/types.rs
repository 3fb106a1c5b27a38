//! Request and response payloads for the relay.
//!
//! Inbound bodies are loosely shaped JSON from a browser client. They are
//! validated once here and turned into an [`UpstreamRequestBody`]; nothing
//! downstream looks at the raw JSON again.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::Error;

/// Temperature sent upstream when the caller does not give a numeric one.
pub const DEFAULT_TEMPERATURE: f64 = 0.6;

/// Chat completion request as sent to the upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequestBody {
    pub model: String,
    /// Forwarded exactly as received, including provider-specific fields
    /// such as `prefix` or `reasoning_content`.
    pub messages: Vec<Value>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<Number>,
    /// Only serialized when true; `stream: false` is never sent.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// Buffered reply returned to the caller.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatReply {
    pub content: String,
}

/// Loose truthiness used for the `stream` flag.
///
/// Browser clients send `true`, `1` or `"yes"` interchangeably; anything that
/// is not null, false, zero or empty counts as a request to stream.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Validate an inbound body and build the upstream request from it.
///
/// An empty body is read as `{}`. `default_model` is used when the request
/// does not carry a non-empty string `model`.
pub fn translate(raw: &[u8], default_model: &str) -> Result<UpstreamRequestBody, Error> {
    let payload: Value = if raw.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(raw).map_err(|e| Error::Validation(format!("Invalid JSON: {}", e)))?
    };

    let messages = match payload.get("messages") {
        Some(Value::Array(items)) if !items.is_empty() => items.clone(),
        _ => {
            return Err(Error::Validation(
                "messages must be a non-empty array".to_string(),
            ))
        }
    };

    let model = payload
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(default_model);
    if model.is_empty() {
        return Err(Error::Validation(
            "model is empty; set DEEPSEEK_MODEL or pass model".to_string(),
        ));
    }

    let temperature = payload
        .get("temperature")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_TEMPERATURE);

    let max_tokens = match payload.get("max_tokens") {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    };

    let stream = payload.get("stream").is_some_and(is_truthy);

    Ok(UpstreamRequestBody {
        model: model.to_string(),
        messages,
        temperature,
        max_tokens,
        stream,
    })
}

/// Pull `choices[0].message.content` out of a completion body.
pub(crate) fn message_content(body: &Value) -> Option<&str> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

/// Human-readable message for an upstream error body.
///
/// Prefers `error.message`, then a top-level `message`, then a synthesized
/// "Upstream HTTP {status}".
pub(crate) fn upstream_error_message(body: &Value, status: u16) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .or_else(|| {
            body.get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
        })
        .map(str::to_owned)
        .unwrap_or_else(|| format!("Upstream HTTP {}", status))
}
