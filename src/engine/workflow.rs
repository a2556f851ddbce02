//! Workflow build: turn the design conversation into an importable n8n
//! workflow JSON file, with a bounded retry loop around malformed output.
//!
//! Only validation failures are retried; a transport or provider failure
//! surfaces immediately since retrying it would not produce different JSON.

use std::sync::Arc;

use chrono::Utc;

use crate::error::AppError;
use crate::validation::validate_workflow_shape;

use super::prompt;
use super::provider::GenerativeProvider;
use super::types::ConversationTurn;

/// Build attempts before giving up on the model producing valid JSON.
pub const MAX_BUILD_ATTEMPTS: u32 = 3;

/// A generated workflow ready to hand to the user as a download.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub filename: String,
    pub document: serde_json::Value,
}

impl WorkflowFile {
    /// Pretty-printed file contents.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_json::to_vec_pretty(&self.document)?)
    }
}

pub struct WorkflowBuilder {
    provider: Arc<dyn GenerativeProvider>,
    max_attempts: u32,
}

impl WorkflowBuilder {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self {
            provider,
            max_attempts: MAX_BUILD_ATTEMPTS,
        }
    }

    #[cfg(test)]
    fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Generate a workflow from the conversation, retrying on malformed or
    /// structurally invalid JSON up to the attempt budget.
    pub async fn build(&self, turns: &[ConversationTurn]) -> Result<WorkflowFile, AppError> {
        let transcript = prompt::design_transcript(turns);
        let request = ConversationTurn::user(prompt::build_prompt(&transcript));

        let mut last_error = AppError::Validation("no build attempt made".into());
        for attempt in 1..=self.max_attempts {
            let raw = self
                .provider
                .complete(prompt::BUILD_SYSTEM, std::slice::from_ref(&request))
                .await?;

            match parse_workflow(&raw) {
                Ok(document) => {
                    tracing::info!(attempt, "Workflow JSON generated");
                    return Ok(WorkflowFile {
                        filename: timestamped_filename(),
                        document,
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Generated workflow rejected");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Parse and shape-check one raw model response.
fn parse_workflow(raw: &str) -> Result<serde_json::Value, AppError> {
    let cleaned = cleanup_json_response(raw);
    let document: serde_json::Value = serde_json::from_str(&cleaned)
        .map_err(|e| AppError::Validation(format!("workflow is not valid JSON: {e}")))?;
    validate_workflow_shape(&document)?;
    Ok(document)
}

/// Strip markdown fences and any prose around the JSON object: keep from the
/// first `{` to the last `}` inclusive.
pub fn cleanup_json_response(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start <= end => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

fn timestamped_filename() -> String {
    format!(
        "n8n-workflow-{}.json",
        Utc::now().format("%Y-%m-%dT%H-%M-%S")
    )
}
