// Backend trait and implementations

pub mod anthropic;

use crate::error::ProxyResult;
use crate::prompt::NormalizedPrompt;
use crate::requestresponsemetadata::{RequestMetadata, ResponseMetadata};
use reqwest::RequestBuilder;
use serde_json::Value;

/// Trait for upstream API implementations.
/// A backend knows where the messages endpoint lives, how to authenticate,
/// and how to read the provider's response format.
pub trait Backend: Send + Sync {
    /// Returns the backend name (e.g., "anthropic")
    fn name(&self) -> &str;

    /// Full URL of the messages endpoint
    fn messages_url(&self) -> String;

    /// Attach credential and protocol headers to an outbound request
    fn authorize(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder;

    /// Outbound JSON body for the given model and prompt
    fn build_request_body(&self, model: &str, prompt: &NormalizedPrompt) -> Value;

    /// Concatenate the text content of a successful response.
    /// Fails when the body does not have the provider's message shape.
    fn extract_text(&self, body: &Value) -> ProxyResult<String>;

    /// Summarize an outbound request for logging
    fn parse_request_metadata(&self, model: &str, prompt: &NormalizedPrompt) -> RequestMetadata {
        let mut meta = RequestMetadata {
            model: model.to_string(),
            has_system_prompt: !prompt.system.is_empty(),
            max_tokens: prompt.max_tokens,
            ..Default::default()
        };
        for message in &prompt.messages {
            match message.role {
                crate::prompt::Role::User => meta.user_message_count += 1,
                crate::prompt::Role::Assistant => meta.assistant_message_count += 1,
            }
        }
        meta
    }

    /// Summarize a successful response for logging.
    /// Default implementation extracts nothing.
    fn parse_response_metadata(&self, _body: &Value) -> ResponseMetadata {
        ResponseMetadata::default()
    }
}

pub use anthropic::AnthropicBackend;
