pub mod anthropic;
pub mod openai;

use async_trait::async_trait;

use crate::config::Settings;
use crate::error::AppError;

use super::types::ConversationTurn;

// =============================================================================
// ProviderKind — which generative backend is selected
// =============================================================================

/// Supported generative service backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Chat-completions envelope; used for the clarification dialogue and
    /// diagram repair calls.
    OpenAi,
    /// Messages envelope; used for the workflow JSON build call.
    Anthropic,
}

impl ProviderKind {
    pub fn from_setting(s: &str) -> Self {
        match s {
            "anthropic" => ProviderKind::Anthropic,
            _ => ProviderKind::OpenAi,
        }
    }

    pub fn as_setting(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

// =============================================================================
// GenerativeProvider trait
// =============================================================================

/// Abstraction over the generative text service.
///
/// A provider accepts system framing plus an ordered list of role-tagged
/// turns and returns the generated text, or an error when the transport
/// fails, the remote returns a non-success status, or the response envelope
/// is missing its structural text field.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Human-readable provider name for error messages and logs.
    fn provider_name(&self) -> &'static str;

    /// Invoke the service with the given framing and conversation window.
    async fn complete(
        &self,
        system: &str,
        turns: &[ConversationTurn],
    ) -> Result<String, AppError>;
}

// =============================================================================
// Factory
// =============================================================================

/// Create the provider for the given kind, or a config error when its
/// credential is missing.
pub fn resolve_provider(
    kind: ProviderKind,
    settings: &Settings,
) -> Result<Box<dyn GenerativeProvider>, AppError> {
    match kind {
        ProviderKind::OpenAi => {
            let key = settings.require_openai_key()?;
            Ok(Box::new(openai::OpenAiProvider::new(
                settings.openai_endpoint.clone(),
                key.to_string(),
                settings.chat_model.clone(),
            )))
        }
        ProviderKind::Anthropic => {
            let key = settings.require_anthropic_key()?;
            Ok(Box::new(anthropic::AnthropicProvider::new(
                settings.anthropic_endpoint.clone(),
                key.to_string(),
                settings.build_model.clone(),
            )))
        }
    }
}

/// Truncate to at most `max` bytes, backing off to a char boundary. Used
/// when quoting remote response bodies in error messages.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
