// Inbound Request Parsing and Prompt Normalization

use crate::config::RelayConfig;
use crate::error::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message content is either plain text or a list of upstream content blocks,
/// which are forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Body accepted on the relay endpoint. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct RelayRequestBody {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Kept loose: non-numeric values fall back to the configured default
    #[serde(default)]
    pub max_tokens: Option<Value>,
    #[serde(default)]
    pub temperature: Option<Value>,
}

impl RelayRequestBody {
    /// Parse a raw request body. An empty body is treated as `{}`.
    pub fn parse(body: &[u8]) -> ProxyResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        let json: Value = serde_json::from_slice(body)
            .map_err(|e| ProxyError::InvalidRequestBody(format!("malformed JSON: {}", e)))?;
        if !json.is_object() {
            return Err(ProxyError::InvalidRequestBody(
                "request body must be a JSON object".to_string(),
            ));
        }

        serde_json::from_value(json).map_err(|e| ProxyError::InvalidRequestBody(e.to_string()))
    }
}

/// Prompt in the shape the upstream API expects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPrompt {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl NormalizedPrompt {
    /// Build the prompt from a parsed body, filling defaults from `config`.
    ///
    /// A non-empty `messages` list wins over `prompt`; `prompt` is promoted to a
    /// single user message. Which of the two is honored at all depends on
    /// `config.input`. An empty message list is never sent upstream.
    pub fn from_body(body: RelayRequestBody, config: &RelayConfig) -> ProxyResult<Self> {
        let messages = match body.messages {
            Some(messages) if config.input.accepts_messages() && !messages.is_empty() => messages,
            _ => match body.prompt {
                Some(prompt) if config.input.accepts_prompt() && !prompt.trim().is_empty() => {
                    vec![ChatMessage::user(prompt)]
                }
                _ => return Err(ProxyError::MissingPrompt),
            },
        };

        Ok(Self {
            system: body.system.unwrap_or_default(),
            messages,
            max_tokens: resolve_max_tokens(body.max_tokens.as_ref(), config.max_tokens)?,
            temperature: resolve_temperature(body.temperature.as_ref(), config.temperature)?,
        })
    }
}

fn resolve_max_tokens(value: Option<&Value>, default: u32) -> ProxyResult<u32> {
    match value {
        // Whole floats such as 1000.0 count as integers
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f <= f64::from(u32::MAX))
                    .map(|f| f as u64)
            })
            .filter(|v| *v > 0)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                ProxyError::InvalidRequestBody(format!(
                    "max_tokens must be a positive integer, got {}",
                    n
                ))
            }),
        _ => Ok(default),
    }
}

fn resolve_temperature(value: Option<&Value>, default: f64) -> ProxyResult<f64> {
    match value.and_then(Value::as_f64) {
        Some(t) if (0.0..=1.0).contains(&t) => Ok(t),
        Some(t) => Err(ProxyError::InvalidRequestBody(format!(
            "temperature must be within [0, 1], got {}",
            t
        ))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcceptedInput;
    use serde_json::json;

    fn normalize(body: Value) -> ProxyResult<NormalizedPrompt> {
        normalize_with(body, &RelayConfig::default())
    }

    fn normalize_with(body: Value, config: &RelayConfig) -> ProxyResult<NormalizedPrompt> {
        let body = RelayRequestBody::parse(body.to_string().as_bytes())?;
        NormalizedPrompt::from_body(body, config)
    }

    #[test]
    fn prompt_becomes_single_user_message() {
        let prompt = normalize(json!({"prompt": "Write a haiku"})).unwrap();

        assert_eq!(prompt.messages, vec![ChatMessage::user("Write a haiku")]);
        assert_eq!(prompt.system, "");
        assert_eq!(prompt.max_tokens, 1000);
        assert_eq!(prompt.temperature, 0.5);
    }

    #[test]
    fn messages_take_precedence_over_prompt() {
        let prompt = normalize(json!({
            "prompt": "ignored",
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello!"},
                {"role": "user", "content": [{"type": "text", "text": "Tell me more"}]}
            ]
        }))
        .unwrap();

        assert_eq!(prompt.messages.len(), 3);
        assert_eq!(prompt.messages[0], ChatMessage::user("Hi"));
        assert_eq!(prompt.messages[1].role, Role::Assistant);
        assert_eq!(
            prompt.messages[2].content,
            MessageContent::Blocks(vec![json!({"type": "text", "text": "Tell me more"})])
        );
    }

    #[test]
    fn empty_messages_fall_back_to_prompt() {
        let prompt = normalize(json!({"messages": [], "prompt": "fallback"})).unwrap();
        assert_eq!(prompt.messages, vec![ChatMessage::user("fallback")]);
    }

    #[test]
    fn missing_prompt_sources_are_rejected() {
        assert!(matches!(normalize(json!({})), Err(ProxyError::MissingPrompt)));
        assert!(matches!(
            normalize(json!({"messages": [], "prompt": "   "})),
            Err(ProxyError::MissingPrompt)
        ));
        assert!(matches!(
            normalize(json!({"system": "be brief", "prompt": null})),
            Err(ProxyError::MissingPrompt)
        ));
    }

    #[test]
    fn input_mode_restricts_accepted_shapes() {
        let messages_only = RelayConfig {
            input: AcceptedInput::MessagesOnly,
            ..RelayConfig::default()
        };
        assert!(matches!(
            normalize_with(json!({"prompt": "hi"}), &messages_only),
            Err(ProxyError::MissingPrompt)
        ));

        let prompt_only = RelayConfig {
            input: AcceptedInput::PromptOnly,
            ..RelayConfig::default()
        };
        let prompt = normalize_with(
            json!({"messages": [{"role": "user", "content": "a"}], "prompt": "b"}),
            &prompt_only,
        )
        .unwrap();
        assert_eq!(prompt.messages, vec![ChatMessage::user("b")]);
    }

    #[test]
    fn caller_overrides_and_defaults() {
        let prompt = normalize(json!({
            "system": "You are terse.",
            "prompt": "hi",
            "max_tokens": 1400,
            "temperature": 0.9
        }))
        .unwrap();
        assert_eq!(prompt.system, "You are terse.");
        assert_eq!(prompt.max_tokens, 1400);
        assert_eq!(prompt.temperature, 0.9);

        let prompt = normalize(json!({
            "prompt": "hi",
            "max_tokens": "lots",
            "temperature": "warm"
        }))
        .unwrap();
        assert_eq!(prompt.max_tokens, 1000);
        assert_eq!(prompt.temperature, 0.5);
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        assert!(matches!(
            normalize(json!({"prompt": "hi", "temperature": 1.2})),
            Err(ProxyError::InvalidRequestBody(_))
        ));
        assert!(matches!(
            normalize(json!({"prompt": "hi", "max_tokens": 0})),
            Err(ProxyError::InvalidRequestBody(_))
        ));
        assert!(matches!(
            normalize(json!({"prompt": "hi", "max_tokens": 12.5})),
            Err(ProxyError::InvalidRequestBody(_))
        ));
        assert!(matches!(
            normalize(json!({"prompt": "hi", "max_tokens": -5})),
            Err(ProxyError::InvalidRequestBody(_))
        ));
    }

    #[test]
    fn whole_float_max_tokens_is_accepted() {
        let prompt = normalize(json!({"prompt": "hi", "max_tokens": 1000.0})).unwrap();
        assert_eq!(prompt.max_tokens, 1000);
    }

    #[test]
    fn malformed_bodies() {
        assert!(matches!(
            RelayRequestBody::parse(b"{not json"),
            Err(ProxyError::InvalidRequestBody(_))
        ));
        assert!(matches!(
            RelayRequestBody::parse(b"[1, 2]"),
            Err(ProxyError::InvalidRequestBody(_))
        ));
        assert!(matches!(
            RelayRequestBody::parse(br#"{"messages": [{"role": "system", "content": "x"}]}"#),
            Err(ProxyError::InvalidRequestBody(_))
        ));
        assert!(matches!(
            RelayRequestBody::parse(br#"{"system": 5}"#),
            Err(ProxyError::InvalidRequestBody(_))
        ));
    }

    #[test]
    fn empty_body_is_an_empty_object() {
        let body = RelayRequestBody::parse(b"").unwrap();
        assert!(body.messages.is_none());
        assert!(body.prompt.is_none());
    }
}
