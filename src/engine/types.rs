use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Conversation
// =============================================================================

/// Role tag for a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged text entry in the dialogue. Append-only, ordered by insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// =============================================================================
// Dialogue stage
// =============================================================================

/// Phase of the clarification dialogue. Advances monotonically within a
/// session; only an explicit session reset returns it to `Initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    Initial,
    Clarifying,
    ReadyForDiagram,
    DiagramGenerated,
}

impl DialogueStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueStage::Initial => "initial",
            DialogueStage::Clarifying => "clarifying",
            DialogueStage::ReadyForDiagram => "ready_for_diagram",
            DialogueStage::DiagramGenerated => "diagram_generated",
        }
    }
}

// =============================================================================
// Diagram attempts
// =============================================================================

/// Status of a diagram rendering attempt within a healing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Rendered,
    Failed,
    Exhausted,
}

/// One diagram instance moving through the healing loop.
///
/// `source_text` mutates between attempts (each repair produces a new value);
/// `original_text` is pinned at creation so a manual retry can start over from
/// the text the model first produced. `attempt_number` counts repair attempts
/// consumed so far and never exceeds the configured maximum.
#[derive(Debug, Clone, Serialize)]
pub struct DiagramAttempt {
    pub id: Uuid,
    pub source_text: String,
    pub original_text: String,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub last_error: Option<String>,
}

impl DiagramAttempt {
    /// Seed a fresh attempt from a diagram block extracted out of a response.
    pub fn new(source_text: impl Into<String>) -> Self {
        let source_text = source_text.into();
        Self {
            id: Uuid::new_v4(),
            original_text: source_text.clone(),
            source_text,
            attempt_number: 0,
            status: AttemptStatus::Pending,
            last_error: None,
        }
    }
}

/// Opaque renderable artifact produced by a successful render.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDiagram {
    /// The exact diagram source that rendered successfully.
    pub source: String,
    /// Renderer-specific payload (SVG text, layout summary, ...).
    pub payload: String,
}
