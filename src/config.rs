//! Configuration loading and validation for chat-relay.
//!
//! Values are layered, lowest precedence first: built-in defaults, an
//! optional TOML file, a `.env` file, and finally the process environment.
//! The result is built once at start-up and shared read-only.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::proxy::endpoint::resolve_endpoint;

/// Variable holding the upstream API key.
pub const API_KEY_VAR: &str = "DEEPSEEK_API_KEY";
/// Variable holding the upstream base URL.
pub const URL_VAR: &str = "DEEPSEEK_URL";
/// Variable holding the default model name.
pub const MODEL_VAR: &str = "DEEPSEEK_MODEL";
/// Variable holding the local port to listen on.
pub const PORT_VAR: &str = "PORT";

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:5179")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:5179".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
///
/// The raw value is only reachable through [`ApiKey::expose_secret`], so every
/// place that puts the key on the wire is greppable.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// Where the API key was resolved from.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Process environment variable (holds var name)
    Env(String),
    /// `.env` file entry (holds var name)
    DotEnv(String),
    /// Literal string in the TOML config
    Literal,
    /// TOML value containing ${VAR} references expanded from variables
    EnvExpanded,
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Env(var) => write!(f, "environment ({})", var),
            KeySource::DotEnv(var) => write!(f, ".env file ({})", var),
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Upstream provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL as configured (e.g., "https://api.deepseek.com/v1")
    pub url: String,
    /// Model used when the request does not name one
    pub model: String,
    /// Key injected as a bearer token on every upstream call
    pub api_key: Option<ApiKey>,
}

impl ProviderConfig {
    /// The key to inject upstream, or the error reported to the caller.
    pub fn api_key(&self) -> Result<&ApiKey, ConfigError> {
        self.api_key
            .as_ref()
            .ok_or(ConfigError::MissingApiKey { var: API_KEY_VAR })
    }

    /// Fully qualified chat-completions endpoint for the configured base URL.
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        resolve_endpoint(&self.url)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read env file '{path}': {source}")]
    DotEnv {
        path: String,
        #[source]
        source: dotenvy::Error,
    },

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Cannot expand variable '{var}' in '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },

    #[error("Missing {var}. Set it in the environment or in a .env file next to the server.")]
    MissingApiKey { var: &'static str },

    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Raw provider table deserialized directly from TOML.
/// `api_key` may contain `${VAR}` references not yet expanded.
#[derive(Debug, Default, Deserialize)]
pub struct RawProviderConfig {
    url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    provider: RawProviderConfig,
}

impl RawConfig {
    /// Parse a TOML document.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }
}

/// Which layer a variable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarOrigin {
    Env,
    DotEnv,
}

/// Variable layers: process environment over `.env` entries.
///
/// The `.env` file is read into a map; the process environment is never
/// mutated.
#[derive(Clone, Default)]
pub struct Variables {
    env: HashMap<String, String>,
    dotenv: HashMap<String, String>,
}

impl Variables {
    pub fn new(env: HashMap<String, String>, dotenv: HashMap<String, String>) -> Self {
        Self { env, dotenv }
    }

    /// Snapshot the process environment and the optional `.env` file.
    pub fn from_process(dotenv_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        let dotenv = match dotenv_path {
            Some(path) => read_dotenv_file(path)?,
            None => HashMap::new(),
        };
        Ok(Self::new(env, dotenv))
    }

    /// Look up a variable. Empty values count as unset.
    pub fn get(&self, name: &str) -> Option<(&str, VarOrigin)> {
        fn non_empty<'m>(map: &'m HashMap<String, String>, name: &str) -> Option<&'m str> {
            map.get(name).map(String::as_str).filter(|v| !v.is_empty())
        }
        non_empty(&self.env, name)
            .map(|v| (v, VarOrigin::Env))
            .or_else(|| non_empty(&self.dotenv, name).map(|v| (v, VarOrigin::DotEnv)))
    }

    fn value(&self, name: &str) -> Option<String> {
        self.get(name).map(|(v, _)| v.to_string())
    }
}

/// Read `KEY=value` entries from a `.env` file.
///
/// A missing file yields an empty map; a malformed one is an error.
pub fn read_dotenv_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No env file found");
        return Ok(HashMap::new());
    }

    let to_error = |source| ConfigError::DotEnv {
        path: path.display().to_string(),
        source,
    };

    let mut entries = HashMap::new();
    for item in dotenvy::from_path_iter(path).map_err(to_error)? {
        let (key, value) = item.map_err(to_error)?;
        entries.insert(key, value);
    }
    Ok(entries)
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple references in one value. Fails on the first missing
/// variable, an unclosed `${`, or an empty variable name.
fn expand_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: "Unclosed '${' in config value".to_string(),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: String::new(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!("'{}' is not set in the environment or .env file", var_name),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Where to load configuration from.
#[derive(Debug, Clone)]
pub struct ConfigSources {
    /// Optional TOML config file
    pub config_file: Option<PathBuf>,
    /// Optional `.env` file; a missing file is ignored
    pub env_file: Option<PathBuf>,
}

impl Default for ConfigSources {
    fn default() -> Self {
        Self {
            config_file: None,
            env_file: Some(PathBuf::from(".env")),
        }
    }
}

impl Config {
    /// Build the final config from a raw TOML document and variable layers.
    ///
    /// Variables override the TOML values; TOML values override defaults.
    /// Returns the config and where the API key came from.
    pub fn from_raw(raw: RawConfig, vars: &Variables) -> Result<(Self, KeySource), ConfigError> {
        let mut server = raw.server;
        if let Some((port, _)) = vars.get(PORT_VAR) {
            let port: u16 = port.parse().map_err(|_| {
                ConfigError::Validation(format!("{} must be a port number, got '{}'", PORT_VAR, port))
            })?;
            server.listen = format!("127.0.0.1:{}", port);
        }

        let url = vars
            .value(URL_VAR)
            .or(raw.provider.url.filter(|u| !u.is_empty()))
            .unwrap_or_else(default_url);
        let model = vars
            .value(MODEL_VAR)
            .or(raw.provider.model.filter(|m| !m.is_empty()))
            .unwrap_or_else(default_model);

        let (api_key, source) = match vars.get(API_KEY_VAR) {
            Some((key, VarOrigin::Env)) => (
                Some(ApiKey::from(key)),
                KeySource::Env(API_KEY_VAR.to_string()),
            ),
            Some((key, VarOrigin::DotEnv)) => (
                Some(ApiKey::from(key)),
                KeySource::DotEnv(API_KEY_VAR.to_string()),
            ),
            None => match raw.provider.api_key.filter(|k| !k.is_empty()) {
                Some(raw_key) if raw_key.contains("${") => {
                    let expanded =
                        expand_vars_with(&raw_key, "provider.api_key", |name| vars.value(name))?;
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
                Some(raw_key) => (Some(ApiKey::from(raw_key)), KeySource::Literal),
                None => (None, KeySource::None),
            },
        };

        let config = Config {
            server,
            provider: ProviderConfig {
                url,
                model,
                api_key,
            },
        };
        config.validate()?;

        Ok((config, source))
    }

    /// Load configuration from the given sources and the process environment.
    pub fn load(sources: &ConfigSources) -> Result<(Self, KeySource), ConfigError> {
        let raw = match &sources.config_file {
            Some(path) => RawConfig::from_file(path)?,
            None => RawConfig::default(),
        };
        let vars = Variables::from_process(sources.env_file.as_deref())?;
        Self::from_raw(raw, &vars)
    }

    /// Validate the configuration.
    ///
    /// A missing key or an unresolvable base URL is only warned about here;
    /// requests report them to the caller as 400s.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen must not be empty".to_string(),
            ));
        }

        if self.provider.api_key.is_none() {
            tracing::warn!(
                var = API_KEY_VAR,
                "No API key configured - chat requests will be rejected"
            );
        }

        if let Err(e) = self.provider.endpoint() {
            tracing::warn!(error = %e, "Base URL does not resolve to an endpoint");
        }

        Ok(())
    }
}
