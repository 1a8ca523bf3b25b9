// Upstream Dispatch
//
// Exactly one POST per relayed request. No retries.

use crate::backends::Backend;
use crate::error::{ProxyError, ProxyResult};
use crate::prompt::NormalizedPrompt;
use flate2::read::GzDecoder;
use reqwest::header::CONTENT_ENCODING;
use reqwest::Client;
use serde_json::Value;
use std::io::Read;
use std::time::Instant;

/// Decompress gzip data
fn decompress_gzip(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => Some(decompressed),
        Err(_) => None,
    }
}

/// Send the prompt upstream and return the parsed success payload
pub async fn dispatch(
    client: &Client,
    backend: &dyn Backend,
    api_key: &str,
    model: &str,
    prompt: &NormalizedPrompt,
) -> ProxyResult<Value> {
    let start_time = Instant::now();
    let url = backend.messages_url();
    let body = backend.build_request_body(model, prompt);
    let req_meta = backend.parse_request_metadata(model, prompt);

    tracing::info!(
        backend = backend.name(),
        model = %req_meta.model,
        max_tokens = req_meta.max_tokens,
        user_messages = req_meta.user_message_count,
        assistant_messages = req_meta.assistant_message_count,
        has_system_prompt = req_meta.has_system_prompt,
        "Sending request to upstream: {}",
        url
    );

    let response = backend
        .authorize(client.post(&url), api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!("Upstream error: {:?}", e);
            ProxyError::UpstreamUnreachable(e.to_string())
        })?;

    let status = response.status();
    let is_gzip = response
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("gzip"))
        .unwrap_or(false);

    let raw = response
        .bytes()
        .await
        .map_err(|e| ProxyError::UpstreamUnreachable(format!("failed to read response: {}", e)))?;
    let bytes = if is_gzip {
        decompress_gzip(&raw).unwrap_or_else(|| raw.to_vec())
    } else {
        raw.to_vec()
    };

    let latency_ms = start_time.elapsed().as_millis() as u64;
    tracing::info!(status = status.as_u16(), latency_ms, "Got response from upstream");

    if !status.is_success() {
        return Err(ProxyError::UpstreamRejected {
            status: status.as_u16(),
            details: error_details(&bytes),
        });
    }

    let payload: Value = serde_json::from_slice(&bytes).map_err(|e| {
        ProxyError::UnexpectedUpstreamShape(format!("response is not JSON: {}", e))
    })?;

    let resp_meta = backend.parse_response_metadata(&payload);
    tracing::info!(
        id = resp_meta.id.as_deref().unwrap_or("-"),
        input_tokens = resp_meta.input_tokens,
        output_tokens = resp_meta.output_tokens,
        cache_read_tokens = resp_meta.cache_read_tokens,
        cache_creation_tokens = resp_meta.cache_creation_tokens,
        stop_reason = resp_meta.stop_reason.as_deref().unwrap_or("-"),
        has_thinking = resp_meta.has_thinking,
        tool_calls = resp_meta.tool_calls.len(),
        "Upstream usage"
    );

    Ok(payload)
}

/// Best-effort parse of an upstream error body; non-JSON bodies are kept as text
fn error_details(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
