// Request and Response Metadata
// Summaries of a relayed exchange, produced by the backend and used for logging

/// Metadata describing the outbound request
#[derive(Default, Clone, Debug, PartialEq)]
pub struct RequestMetadata {
    pub model: String,
    pub has_system_prompt: bool,
    pub user_message_count: u32,
    pub assistant_message_count: u32,
    pub max_tokens: u32,
}

/// Metadata extracted from a successful upstream response
#[derive(Default, Clone, Debug, PartialEq)]
pub struct ResponseMetadata {
    pub id: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub stop_reason: Option<String>,
    pub has_thinking: bool,
    /// Names of the tools the model asked to call, in order
    pub tool_calls: Vec<String>,
}
