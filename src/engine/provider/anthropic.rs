//! Messages-envelope backend for the workflow JSON build call.
//!
//! The conversation window is flattened into a single user instruction —
//! the build path sends one prompt, not a multi-turn exchange.

use async_trait::async_trait;
use serde::Serialize;

use crate::engine::types::ConversationTurn;
use crate::error::AppError;

use super::{truncate, GenerativeProvider};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Build calls want determinism, not creativity.
const BUILD_TEMPERATURE: f32 = 0.1;
const BUILD_MAX_TOKENS: u32 = 64_000;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

pub struct AnthropicProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("failed to build reqwest client");
        Self { http, endpoint, api_key, model }
    }
}

#[async_trait]
impl GenerativeProvider for AnthropicProvider {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(
        &self,
        system: &str,
        turns: &[ConversationTurn],
    ) -> Result<String, AppError> {
        let flattened = flatten_turns(turns);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: BUILD_MAX_TOKENS,
            system,
            messages: vec![UserMessage { role: "user", content: &flattened }],
            temperature: BUILD_TEMPERATURE,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Messages request failed");
            return Err(AppError::Provider(format!(
                "messages request failed with status {status}: {}",
                truncate(&text, 300)
            )));
        }

        let envelope: serde_json::Value = response.json().await?;
        extract_text(&envelope)
    }
}

/// Collapse the window into one instruction string, tagging non-user turns
/// so the model still sees who said what.
fn flatten_turns(turns: &[ConversationTurn]) -> String {
    if turns.len() == 1 {
        return turns[0].content.clone();
    }
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Locate the generated text inside the messages envelope.
fn extract_text(envelope: &serde_json::Value) -> Result<String, AppError> {
    envelope
        .pointer("/content/0/text")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Provider("malformed response envelope: missing content[0].text".into())
        })
}
