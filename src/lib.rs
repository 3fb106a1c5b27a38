//! chat-relay - a minimal chat-completions relay for DeepSeek-compatible APIs
//!
//! This library provides the proxy core (endpoint resolution, request
//! translation, buffered and streaming response relay) together with the
//! configuration layer and the axum adapter that serves it.

pub mod config;
pub mod error;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
