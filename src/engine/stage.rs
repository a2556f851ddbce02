//! Dialogue stage controller: decides which phase the conversation is in and
//! splits assistant replies around an embedded diagram block.
//!
//! Stage movement is monotone within a session. A reply that carries a
//! diagram forces the terminal stage no matter how few clarification rounds
//! have happened; otherwise the stage ratchets forward one step at a time.

use std::sync::OnceLock;

use regex::Regex;

use super::types::DialogueStage;

/// Assistant clarification rounds before the dialogue is considered ready
/// for a diagram.
pub const CLARIFICATION_ROUNDS: u32 = 2;

fn stage_rank(stage: DialogueStage) -> u8 {
    match stage {
        DialogueStage::Initial => 0,
        DialogueStage::Clarifying => 1,
        DialogueStage::ReadyForDiagram => 2,
        DialogueStage::DiagramGenerated => 3,
    }
}

/// Compute the stage after an assistant reply.
///
/// `clarifications` counts assistant replies that did not carry a diagram,
/// including the one being processed. The result never ranks below
/// `current`.
pub fn next_stage(
    current: DialogueStage,
    clarifications: u32,
    reply_has_diagram: bool,
) -> DialogueStage {
    let candidate = if reply_has_diagram {
        DialogueStage::DiagramGenerated
    } else if clarifications >= CLARIFICATION_ROUNDS {
        DialogueStage::ReadyForDiagram
    } else {
        DialogueStage::Clarifying
    };

    if stage_rank(candidate) >= stage_rank(current) {
        candidate
    } else {
        current
    }
}

// =============================================================================
// Diagram block extraction
// =============================================================================

/// An assistant reply split around its first fenced diagram block.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReply {
    /// Prose before the fence, trimmed.
    pub before: String,
    /// The diagram source between the fences, trimmed. `None` when the reply
    /// carries no diagram.
    pub diagram: Option<String>,
    /// Prose after the closing fence, trimmed.
    pub after: String,
}

impl SplitReply {
    pub fn has_diagram(&self) -> bool {
        self.diagram.is_some()
    }
}

fn diagram_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```mermaid\s*\n(.*?)```").expect("diagram fence regex must compile")
    })
}

/// Split a reply around its first ```mermaid fenced block. Text outside the
/// fence is preserved so the caller can show prose and diagram separately.
pub fn split_reply(reply: &str) -> SplitReply {
    match diagram_fence_regex().captures(reply) {
        Some(caps) => {
            let whole = caps.get(0).expect("capture 0 always present");
            let diagram = caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            SplitReply {
                before: reply[..whole.start()].trim().to_string(),
                diagram,
                after: reply[whole.end()..].trim().to_string(),
            }
        }
        None => SplitReply {
            before: reply.trim().to_string(),
            diagram: None,
            after: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ratchets_forward() {
        assert_eq!(
            next_stage(DialogueStage::Initial, 1, false),
            DialogueStage::Clarifying
        );
        assert_eq!(
            next_stage(DialogueStage::Clarifying, 2, false),
            DialogueStage::ReadyForDiagram
        );
    }

    #[test]
    fn test_diagram_forces_terminal_stage_early() {
        // A diagram in the very first reply jumps straight to the end.
        assert_eq!(
            next_stage(DialogueStage::Initial, 1, true),
            DialogueStage::DiagramGenerated
        );
    }

    #[test]
    fn test_stage_never_regresses() {
        // A later reply without a diagram must not move backwards.
        assert_eq!(
            next_stage(DialogueStage::DiagramGenerated, 1, false),
            DialogueStage::DiagramGenerated
        );
        assert_eq!(
            next_stage(DialogueStage::ReadyForDiagram, 0, false),
            DialogueStage::ReadyForDiagram
        );
    }

    #[test]
    fn test_split_reply_extracts_block_and_prose() {
        let reply = "Here is the workflow:\n\n```mermaid\ngraph TD\n    A --> B\n```\n\nWant changes?";
        let split = split_reply(reply);
        assert_eq!(split.before, "Here is the workflow:");
        assert_eq!(split.diagram.as_deref(), Some("graph TD\n    A --> B"));
        assert_eq!(split.after, "Want changes?");
    }

    #[test]
    fn test_split_reply_without_fence() {
        let split = split_reply("Which mailbox do you use?");
        assert!(!split.has_diagram());
        assert_eq!(split.before, "Which mailbox do you use?");
        assert!(split.after.is_empty());
    }

    #[test]
    fn test_split_reply_first_block_only() {
        let reply = "```mermaid\ngraph TD\n    A --> B\n```\ntext\n```mermaid\ngraph LR\n    C --> D\n```";
        let split = split_reply(reply);
        assert_eq!(split.diagram.as_deref(), Some("graph TD\n    A --> B"));
        assert!(split.after.contains("graph LR"));
    }

    #[test]
    fn test_empty_fence_is_no_diagram() {
        let split = split_reply("```mermaid\n\n```");
        assert!(!split.has_diagram());
    }
}
