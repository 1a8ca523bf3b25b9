// Relay Error Taxonomy
//
// Every failure is terminal for the request and is rendered as a JSON body:
// {"error": "...", "status": <code>, "details": <optional>}

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Anything other than POST or OPTIONS
    #[error("Method {0} not allowed")]
    UnsupportedMethod(Method),
    /// No upstream API key configured on the server
    #[error("Missing ANTHROPIC_API_KEY in server configuration")]
    MissingCredential,
    /// Body is not valid JSON or does not have the expected shape
    #[error("Invalid request body")]
    InvalidRequestBody(String),
    /// Neither `messages` nor `prompt` produced a message
    #[error("Request must include a non-empty `messages` array or `prompt` string")]
    MissingPrompt,
    /// Transport failure talking to the upstream API
    #[error("Upstream API unreachable")]
    UpstreamUnreachable(String),
    /// Upstream answered with a non-success status
    #[error("Upstream API request failed")]
    UpstreamRejected { status: u16, details: Value },
    /// Upstream answered 2xx but the body is not a content-block message
    #[error("Unexpected upstream response shape")]
    UnexpectedUpstreamShape(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::MissingPrompt => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Upstream statuses outside the valid range are reported as a bad gateway
            ProxyError::UpstreamRejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::UnexpectedUpstreamShape(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            ProxyError::InvalidRequestBody(reason)
            | ProxyError::UpstreamUnreachable(reason)
            | ProxyError::UnexpectedUpstreamShape(reason) => Some(Value::String(reason.clone())),
            ProxyError::UpstreamRejected { details, .. } => Some(details.clone()),
            ProxyError::UnsupportedMethod(_)
            | ProxyError::MissingCredential
            | ProxyError::MissingPrompt => None,
        }
    }

    /// JSON body sent back to the caller
    pub fn to_json(&self) -> Value {
        let status = self.status_code();
        let mut body = json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        body
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), details = ?self.details(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), details = ?self.details(), "{}", self);
        }

        let mut response = (status, Json(self.to_json())).into_response();
        if let ProxyError::UnsupportedMethod(_) = self {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
        }
        response
    }
}

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;
