// HTTP Relay Server and Handler

use crate::backends::{AnthropicBackend, Backend};
use crate::config::{RelayConfig, ResponseEnvelope, ServerArgs};
use crate::error::{ProxyError, ProxyResult};
use crate::prompt::{NormalizedPrompt, RelayRequestBody};
use crate::upstream;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Largest request body the relay will buffer
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct ProxyState {
    config: Arc<RelayConfig>,
    backend: Arc<dyn Backend>,
    client: Client,
}

impl ProxyState {
    pub fn new(config: RelayConfig) -> reqwest::Result<Self> {
        let backend: Arc<dyn Backend> = Arc::new(AnthropicBackend::from_config(&config));
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: RelayConfig, backend: Arc<dyn Backend>) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config: Arc::new(config),
            backend,
            client,
        })
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

/// Empty 204 answering a CORS preflight
fn preflight_response() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

/// Stamp the allowed origin on every response, errors included
async fn apply_cors(State(state): State<ProxyState>, mut response: Response) -> Response {
    let headers: &mut HeaderMap = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        state.config.allow_origin.clone(),
    );
    if state.config.allow_origin != "*" {
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }
    response
}

async fn relay_handler(State(state): State<ProxyState>, req: Request) -> Response {
    let start_time = Instant::now();
    let method = req.method().clone();

    // Preflight is answered before anything else is looked at
    if method == Method::OPTIONS {
        tracing::debug!("Answering CORS preflight");
        return preflight_response();
    }

    let response = handle(&state, req).await.into_response();
    tracing::info!(
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start_time.elapsed().as_millis() as u64,
        "Relay request finished"
    );
    response
}

/// Validate, normalize, dispatch and shape one relay request
async fn handle(state: &ProxyState, req: Request) -> ProxyResult<Response> {
    let config = &state.config;

    if req.method() != Method::POST {
        return Err(ProxyError::UnsupportedMethod(req.method().clone()));
    }

    let api_key = config
        .api_key
        .as_deref()
        .ok_or(ProxyError::MissingCredential)?;

    let body_bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            ProxyError::InvalidRequestBody(format!(
                "failed to read request body (limit {} bytes): {}",
                MAX_BODY_BYTES, e
            ))
        })?;

    let body = RelayRequestBody::parse(&body_bytes)?;
    let prompt = NormalizedPrompt::from_body(body, config)?;

    let payload = upstream::dispatch(
        &state.client,
        state.backend.as_ref(),
        api_key,
        &config.model,
        &prompt,
    )
    .await?;

    let text = state.backend.extract_text(&payload)?;
    let envelope = match config.envelope {
        ResponseEnvelope::Combined => json!({"text": text, "raw": payload}),
        ResponseEnvelope::Raw => payload,
        ResponseEnvelope::Text => json!({"text": text}),
    };

    Ok((StatusCode::OK, Json(envelope)).into_response())
}

/// Build the relay router: health check on `/`, relay endpoint on `route`
pub fn create_router(state: ProxyState, route: &str) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route(route, any(relay_handler))
        .fallback(|| async { (StatusCode::NOT_FOUND, Body::from("Not Found")) })
        .layer(middleware::map_response_with_state(state.clone(), apply_cors))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Received shutdown signal, stopping relay server...");
}

pub async fn start_proxy_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = args.relay_config().context("invalid relay configuration")?;
    if config.api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY is not set; relay requests will fail with 500");
    }

    let state = ProxyState::new(config).context("failed to build HTTP client")?;
    let app = create_router(state, &args.route);

    let addr = args.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Relay server running on http://{}{}", addr, args.route);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server error")?;

    tracing::info!("Relay server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn test_router(config: RelayConfig) -> Router {
        create_router(ProxyState::new(config).unwrap(), "/generate")
    }

    #[tokio::test]
    async fn preflight_ignores_body_and_credentials() {
        let response = test_router(RelayConfig::default())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/generate")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn configured_origin_is_echoed_with_vary() {
        let config = RelayConfig {
            allow_origin: HeaderValue::from_static("https://app.example.com"),
            ..RelayConfig::default()
        };
        let response = test_router(config)
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/generate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(response.headers()[header::VARY], "Origin");
    }

    #[tokio::test]
    async fn oversized_body_names_the_limit() {
        let config = RelayConfig {
            api_key: Some("sk-test".to_string()),
            upstream_url: "http://127.0.0.1:1".to_string(),
            ..RelayConfig::default()
        };
        let oversized = format!(r#"{{"prompt": "{}"}}"#, "a".repeat(MAX_BODY_BYTES));
        let response = test_router(config)
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/generate")
                    .body(Body::from(oversized))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Invalid request body");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .contains(&MAX_BODY_BYTES.to_string()));
    }

    #[tokio::test]
    async fn health_check() {
        let response = test_router(RelayConfig::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"status":"healthy"}"#);
    }
}
