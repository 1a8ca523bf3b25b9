// Relay Configuration
//
// `ServerArgs` is the command line / environment surface. It is parsed once at
// start-up and turned into a `RelayConfig`, which is injected into the handler.

use axum::http::HeaderValue;
use clap::{Parser, ValueEnum};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8008;
pub const DEFAULT_ROUTE: &str = "/generate";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f64 = 0.5;
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which inbound prompt shapes the handler honors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AcceptedInput {
    /// `messages` when non-empty, otherwise `prompt`
    #[default]
    Any,
    #[value(name = "messages")]
    MessagesOnly,
    #[value(name = "prompt")]
    PromptOnly,
}

impl AcceptedInput {
    pub fn accepts_messages(self) -> bool {
        matches!(self, AcceptedInput::Any | AcceptedInput::MessagesOnly)
    }

    pub fn accepts_prompt(self) -> bool {
        matches!(self, AcceptedInput::Any | AcceptedInput::PromptOnly)
    }
}

/// Shape of a successful response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResponseEnvelope {
    /// `{"text": ..., "raw": <upstream payload>}`
    #[default]
    Combined,
    /// Upstream payload passed through untouched
    Raw,
    /// `{"text": ...}`
    Text,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("temperature must be within [0, 1], got {0}")]
    TemperatureOutOfRange(f64),
    #[error("max tokens must be greater than zero")]
    ZeroMaxTokens,
    #[error("route must start with '/' and cannot be '/' itself, got {0:?}")]
    InvalidRoute(String),
    #[error("allow-origin {0:?} is not a valid header value")]
    InvalidOrigin(String),
}

#[derive(Parser, Debug, Clone)]
#[command(name = "prompt-relay")]
#[command(
    about = "CORS-enabled relay from browser clients to the Anthropic Messages API. \
Use --envelope raw to pass the upstream payload through unchanged."
)]
pub struct ServerArgs {
    /// Listen address
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    pub host: String,

    /// Listen port
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RELAY_PORT")]
    pub port: u16,

    /// Path the relay endpoint is mounted on
    #[arg(long, default_value = DEFAULT_ROUTE, env = "RELAY_ROUTE")]
    pub route: String,

    /// Upstream API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model sent to the upstream API
    #[arg(long, default_value = DEFAULT_MODEL, env = "ANTHROPIC_MODEL")]
    pub model: String,

    /// Default max_tokens when the caller does not supply one
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS, env = "ANTHROPIC_MAX_TOKENS")]
    pub max_tokens: u32,

    /// Default temperature when the caller does not supply one
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE, env = "RELAY_TEMPERATURE")]
    pub temperature: f64,

    /// Upstream base URL
    #[arg(long, default_value = crate::backends::anthropic::ANTHROPIC_BASE_URL, env = "ANTHROPIC_BASE_URL")]
    pub upstream_url: String,

    /// Value of the anthropic-version header
    #[arg(long, default_value = DEFAULT_ANTHROPIC_VERSION, env = "ANTHROPIC_VERSION")]
    pub anthropic_version: String,

    /// Upstream request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "RELAY_UPSTREAM_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Access-Control-Allow-Origin value
    #[arg(long, default_value = "*", env = "RELAY_ALLOW_ORIGIN")]
    pub allow_origin: String,

    /// Accepted prompt shapes
    #[arg(long, value_enum, default_value_t = AcceptedInput::Any, env = "RELAY_INPUT")]
    pub input: AcceptedInput,

    /// Success response envelope; `raw` passes the upstream payload through unchanged
    #[arg(long, value_enum, default_value_t = ResponseEnvelope::Combined, env = "RELAY_ENVELOPE")]
    pub envelope: ResponseEnvelope,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the arguments and build the handler configuration
    pub fn relay_config(&self) -> Result<RelayConfig, ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        // `/` is taken by the health check
        if !self.route.starts_with('/') || self.route == "/" {
            return Err(ConfigError::InvalidRoute(self.route.clone()));
        }
        let allow_origin = HeaderValue::from_str(&self.allow_origin)
            .map_err(|_| ConfigError::InvalidOrigin(self.allow_origin.clone()))?;

        Ok(RelayConfig {
            api_key: self.api_key.clone().filter(|key| !key.trim().is_empty()),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            upstream_url: self.upstream_url.trim_end_matches('/').to_string(),
            anthropic_version: self.anthropic_version.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            allow_origin,
            input: self.input,
            envelope: self.envelope,
        })
    }
}

/// Everything the relay handler needs to serve a request
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// `None` means requests fail with `MissingCredential`
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub upstream_url: String,
    pub anthropic_version: String,
    pub timeout: Duration,
    pub allow_origin: HeaderValue,
    pub input: AcceptedInput,
    pub envelope: ResponseEnvelope,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            upstream_url: crate::backends::anthropic::ANTHROPIC_BASE_URL.to_string(),
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            allow_origin: HeaderValue::from_static("*"),
            input: AcceptedInput::default(),
            envelope: ResponseEnvelope::default(),
        }
    }
}
