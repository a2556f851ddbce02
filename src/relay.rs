//! Credential relay: a small HTTP server that forwards build requests to the
//! messages endpoint so the browser never talks to it directly.
//!
//! The relay validates the request envelope, forwards it with the caller's
//! credential, and mirrors the remote status and body back verbatim. It holds
//! no credentials of its own.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State as AxumState,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Settings;
use crate::engine::provider::anthropic::ANTHROPIC_VERSION;

/// Token budget for relayed build calls.
const RELAY_MAX_TOKENS: u32 = 64_000;
const RELAY_TEMPERATURE: f32 = 0.1;

/// Shared state for the relay HTTP server.
#[derive(Clone)]
pub struct RelayState {
    pub http: reqwest::Client,
    pub endpoint: String,
    pub model: String,
}

impl RelayState {
    pub fn new(settings: &Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("failed to build reqwest client");
        Self {
            http,
            endpoint: settings.anthropic_endpoint.clone(),
            model: settings.build_model.clone(),
        }
    }
}

pub fn router(state: Arc<RelayState>) -> Router {
    // Browser callers need permissive CORS; method routing answers 405 for
    // anything but POST on the relay path.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/claude-proxy", post(relay_request))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// Start the relay server.
pub async fn start_relay_server(
    settings: &Settings,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = Arc::new(RelayState::new(settings));
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], settings.relay_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("Relay server shutting down");
        })
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "flowplan-relay" }))
}

/// POST /api/claude-proxy — validate the envelope, forward to the messages
/// endpoint with the caller's credential, and mirror the response.
async fn relay_request(
    AxumState(state): AxumState<Arc<RelayState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let missing = missing_fields(&body);
    if !missing.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("Missing required fields: {}", missing.join(", ")),
            })),
        )
            .into_response();
    }

    // Presence was just checked.
    let instructions = body["instructions"].as_str().unwrap_or_default();
    let content = body["content"].as_str().unwrap_or_default();
    let credential = body["credential"].as_str().unwrap_or_default();

    let upstream_body = upstream_request(&state.model, instructions, content);

    let response = state
        .http
        .post(&state.endpoint)
        .header("x-api-key", credential)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&upstream_body)
        .send()
        .await;

    match response {
        Ok(resp) => {
            // Mirror the remote status and body verbatim, success or not.
            let status = resp.status();
            let bytes = resp.bytes().await.unwrap_or_default();
            tracing::debug!(status = %status, "Relay response forwarded");
            (
                StatusCode::from_u16(status.as_u16())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                [(header::CONTENT_TYPE, "application/json")],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Relay request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Failed to process request",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Required string fields that are absent or empty, in declaration order.
fn missing_fields(body: &serde_json::Value) -> Vec<&'static str> {
    ["instructions", "content", "credential"]
        .into_iter()
        .filter(|field| {
            body.get(field)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .map_or(true, str::is_empty)
        })
        .collect()
}

/// Messages-endpoint body for a relayed build call.
fn upstream_request(model: &str, instructions: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "max_tokens": RELAY_MAX_TOKENS,
        "temperature": RELAY_TEMPERATURE,
        "system": instructions,
        "messages": [{ "role": "user", "content": content }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_named_in_order() {
        let body = json!({ "content": "design transcript" });
        assert_eq!(missing_fields(&body), vec!["instructions", "credential"]);
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        let body = json!({
            "instructions": "build it",
            "content": "   ",
            "credential": "sk-key",
        });
        assert_eq!(missing_fields(&body), vec!["content"]);
    }

    #[test]
    fn test_complete_envelope_passes() {
        let body = json!({
            "instructions": "build it",
            "content": "design transcript",
            "credential": "sk-key",
        });
        assert!(missing_fields(&body).is_empty());
    }

    #[test]
    fn test_upstream_body_shape() {
        let body = upstream_request("claude-sonnet-4-20250514", "sys", "user text");
        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "user text");
        assert_eq!(body["max_tokens"], RELAY_MAX_TOKENS);
    }
}
