// Anthropic Messages API Backend

use crate::backends::Backend;
use crate::config::RelayConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::prompt::NormalizedPrompt;
use crate::requestresponsemetadata::ResponseMetadata;
use reqwest::RequestBuilder;
use serde_json::{json, Value};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const MESSAGES_PATH: &str = "/v1/messages";

pub struct AnthropicBackend {
    base_url: String,
    version: String,
}

impl AnthropicBackend {
    pub fn new(base_url: impl Into<String>, version: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            version: version.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.upstream_url.clone(), config.anthropic_version.clone())
    }
}

impl Default for AnthropicBackend {
    fn default() -> Self {
        Self::new(ANTHROPIC_BASE_URL, crate::config::DEFAULT_ANTHROPIC_VERSION)
    }
}

impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn messages_url(&self) -> String {
        format!("{}{}", self.base_url, MESSAGES_PATH)
    }

    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        request
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.version)
    }

    fn build_request_body(&self, model: &str, prompt: &NormalizedPrompt) -> Value {
        json!({
            "model": model,
            "max_tokens": prompt.max_tokens,
            "system": prompt.system,
            "messages": prompt.messages,
            "temperature": prompt.temperature,
        })
    }

    fn extract_text(&self, body: &Value) -> ProxyResult<String> {
        let content = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProxyError::UnexpectedUpstreamShape(
                    "response has no `content` array".to_string(),
                )
            })?;

        let mut parts = Vec::new();
        for (index, block) in content.iter().enumerate() {
            let block_type = block.get("type").and_then(Value::as_str).ok_or_else(|| {
                ProxyError::UnexpectedUpstreamShape(format!(
                    "content block {} has no `type` tag",
                    index
                ))
            })?;
            if block_type != "text" {
                continue;
            }
            let text = block.get("text").and_then(Value::as_str).ok_or_else(|| {
                ProxyError::UnexpectedUpstreamShape(format!(
                    "text block {} has no `text` string",
                    index
                ))
            })?;
            parts.push(text);
        }

        Ok(parts.join("\n"))
    }

    fn parse_response_metadata(&self, body: &Value) -> ResponseMetadata {
        let mut meta = ResponseMetadata {
            id: body.get("id").and_then(Value::as_str).map(str::to_string),
            stop_reason: body
                .get("stop_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..Default::default()
        };

        if let Some(content) = body.get("content").and_then(Value::as_array) {
            for block in content {
                match block.get("type").and_then(Value::as_str) {
                    Some("thinking") => meta.has_thinking = true,
                    Some("tool_use") => {
                        let name = block.get("name").and_then(Value::as_str).unwrap_or("");
                        meta.tool_calls.push(name.to_string());
                    }
                    _ => {}
                }
            }
        }

        if let Some(usage) = body.get("usage") {
            let count = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
            meta.input_tokens = count("input_tokens");
            meta.output_tokens = count("output_tokens");
            meta.cache_read_tokens = count("cache_read_input_tokens");
            meta.cache_creation_tokens = count("cache_creation_input_tokens");
        }

        meta
    }
}
