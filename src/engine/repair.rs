//! Diagram repair requester: asks the generative service for a corrected
//! version of a diagram the renderer rejected.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AppError;

use super::prompt;
use super::provider::GenerativeProvider;
use super::types::ConversationTurn;

/// Seam for the healing loop. Implementations return a candidate repaired
/// text for the caller to re-render; they never mutate the attempt and
/// never retry internally — retry policy lives in the state machine.
#[async_trait]
pub trait RepairRequester: Send + Sync {
    async fn request_repair(&self, broken: &str, diagnostic: &str) -> Result<String, AppError>;
}

/// Production requester backed by a generative provider.
pub struct ModelRepairRequester {
    provider: Arc<dyn GenerativeProvider>,
}

impl ModelRepairRequester {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RepairRequester for ModelRepairRequester {
    async fn request_repair(&self, broken: &str, diagnostic: &str) -> Result<String, AppError> {
        let turn = ConversationTurn::user(prompt::repair_prompt(broken, diagnostic));

        // Network failure, non-success status, and a malformed envelope all
        // surface as the same error kind carrying the underlying message.
        let text = self
            .provider
            .complete(prompt::REPAIR_SYSTEM, std::slice::from_ref(&turn))
            .await
            .map_err(|e| AppError::RepairRequest(e.to_string()))?;

        Ok(strip_code_fences(&text))
    }
}

/// Strip leading/trailing code-fence markers the model may have wrapped the
/// answer in, and trim surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if lines
        .first()
        .is_some_and(|l| l.trim_start().starts_with("```"))
    {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}
