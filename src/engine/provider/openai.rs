//! Chat-completions backend for the clarification dialogue and repair calls.

use async_trait::async_trait;
use serde::Serialize;

use crate::engine::types::ConversationTurn;
use crate::error::AppError;

use super::{truncate, GenerativeProvider};

/// Dialogue calls use a creative temperature; the original planner used the
/// same settings for clarification and diagram generation.
const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_TOKENS: u32 = 5000;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

pub struct OpenAiProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// The underlying `reqwest::Client` is configured with a 60-second
    /// timeout; generation calls are slow but not unbounded.
    pub fn new(endpoint: String, api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self { http, endpoint, api_key, model }
    }
}

#[async_trait]
impl GenerativeProvider for OpenAiProvider {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn complete(
        &self,
        system: &str,
        turns: &[ConversationTurn],
    ) -> Result<String, AppError> {
        let mut messages = vec![ChatMessage { role: "system", content: system }];
        messages.extend(turns.iter().map(|t| ChatMessage {
            role: t.role.as_str(),
            content: &t.content,
        }));

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Chat completion request failed");
            return Err(AppError::Provider(format!(
                "chat completion failed with status {status}: {}",
                truncate(&text, 300)
            )));
        }

        let envelope: serde_json::Value = response.json().await?;
        extract_text(&envelope)
    }
}

/// Locate the generated text inside the chat-completions envelope.
/// A missing structural field is a provider error, not a panic.
fn extract_text(envelope: &serde_json::Value) -> Result<String, AppError> {
    envelope
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Provider(
                "malformed response envelope: missing choices[0].message.content".into(),
            )
        })
}
