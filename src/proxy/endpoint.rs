//! Upstream endpoint resolution.
//!
//! Operators may configure the provider as a bare host, a `/v1` base, or the
//! full chat-completions URL. All of them resolve to the same endpoint.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::config::ConfigError;

const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";
const VERSION_SUFFIX: &str = "/v1";

fn slash_runs() -> &'static Regex {
    static SLASH_RUNS: OnceLock<Regex> = OnceLock::new();
    SLASH_RUNS.get_or_init(|| Regex::new(r"/{2,}").expect("static regex is valid"))
}

fn collapse_slashes(path: &str) -> String {
    slash_runs().replace_all(path, "/").into_owned()
}

/// Resolve the chat-completions endpoint for a configured base URL.
///
/// Idempotent: resolving an already-resolved endpoint returns it unchanged.
/// Query strings and fragments are carried through untouched.
///
/// ```
/// use chat_relay::proxy::endpoint::resolve_endpoint;
///
/// assert_eq!(
///     resolve_endpoint("https://api.deepseek.com").unwrap(),
///     "https://api.deepseek.com/v1/chat/completions"
/// );
/// ```
pub fn resolve_endpoint(base_url: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }

    // Operator supplied the full path.
    if url.path().ends_with(CHAT_COMPLETIONS_SUFFIX) {
        return Ok(url.to_string());
    }

    let mut base_path = url.path().trim_end_matches('/').to_string();
    if !base_path.ends_with(CHAT_COMPLETIONS_SUFFIX) {
        if !base_path.ends_with(VERSION_SUFFIX) {
            base_path.push_str(VERSION_SUFFIX);
        }
        base_path.push_str(CHAT_COMPLETIONS_SUFFIX);
    }

    url.set_path(&collapse_slashes(&base_path));
    Ok(url.to_string())
}
