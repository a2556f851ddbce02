//! Prompt templates: stage-specific system instructions, the diagram repair
//! prompt, and the workflow build prompts.

use super::types::{ConversationTurn, DialogueStage};

/// Trailing window of turns included when constructing prompts. The full
/// history is kept elsewhere for display and transcript extraction.
pub const PROMPT_WINDOW: usize = 10;

/// Turns included ahead of the post-diagram explanation request.
pub const EXPLANATION_WINDOW: usize = 5;

const BASE_PROMPT: &str = "You are an expert workflow automation consultant specializing in n8n \
workflows. Your goal is to help users plan and design automation workflows through collaborative \
dialogue. Always be friendly, encouraging, and educational.";

const DESIGN_PRINCIPLES: &str = "\
Key n8n design principles to follow:
- Use descriptive node names that explain their function
- Prefer Switch nodes over IF nodes for conditional logic
- Start with cheaper AI models before expensive ones
- Implement retry logic (3-5 retries with delays) for external APIs
- Use centralized configuration nodes early in workflows
- Group related fields using dot notation
- Build in human oversight for critical decisions";

const MERMAID_RULES: &str = "\
CRITICAL MERMAID SYNTAX RULES:
- Every node ID must be defined before it's referenced
- Use only alphanumeric characters for node IDs (no spaces or special chars)
- Node shapes: [text] for rectangles, {text} for diamonds, ([text]) for rounded
- Arrow types: --> for solid, -.-> for dotted, ==> for thick
- For text with special characters, wrap in quotes: [\"Text with (parentheses)\"]
- Keep node IDs simple: A, B, C or Step1, Step2, Step3

CORRECT EXAMPLE:
```mermaid
graph TD
    Start[Daily Trigger] --> Fetch[Fetch YouTube Data]
    Fetch --> Check{New Videos?}
    Check -->|Yes| Process[Process Video Data]
    Check -->|No| End1[End Workflow]
    Process --> Save[Save to Database]
    Save --> Notify[Send Notification]
    Notify --> End2[End Workflow]
```

AVOID THESE COMMON ERRORS:
- Don't use undefined node IDs
- Don't use spaces in node IDs (use Step1 not \"Step 1\")
- Don't forget to close brackets/braces
- Don't use special characters in IDs";

/// Select the system instructions for the current dialogue stage.
///
/// `ReadyForDiagram` and `DiagramGenerated` both select diagram-producing
/// instructions; the earlier stages gather requirements.
pub fn system_prompt_for(stage: DialogueStage) -> String {
    match stage {
        DialogueStage::Initial => format!(
            "{BASE_PROMPT}\n\n\
             The user has just described what they want to automate. Ask 2-3 clarifying \
             questions to better understand their needs. Focus on:\n\
             1. What specific systems or tools they're currently using\n\
             2. Whether these systems have APIs or integration capabilities\n\
             3. The current manual process they follow\n\
             4. The expected volume and frequency of the workflow\n\n\
             Be conversational but concise. After the user provides this information, you'll \
             help them create a detailed workflow diagram.\n\n{DESIGN_PRINCIPLES}"
        ),
        DialogueStage::Clarifying => format!(
            "{BASE_PROMPT}\n\n\
             Continue gathering information about the user's workflow needs. If they seem \
             unclear or provide incomplete answers, make educated assumptions about their \
             process and confirm with them. After this round of clarification, you should \
             have enough information to create a workflow diagram.\n\n{DESIGN_PRINCIPLES}"
        ),
        DialogueStage::ReadyForDiagram | DialogueStage::DiagramGenerated => format!(
            "{BASE_PROMPT}\n\n\
             Based on the conversation so far, create a detailed Mermaid diagram showing the \
             workflow the user wants to automate.\n\n{MERMAID_RULES}\n\n\
             The diagram should show all major steps, include decision points and branches, \
             indicate which systems or APIs are involved at each step, and use clear labels. \
             After presenting the diagram, ask if they'd like to modify any part of it.\n\n\
             {DESIGN_PRINCIPLES}"
        ),
    }
}

// =============================================================================
// Diagram repair
// =============================================================================

/// Fixed system framing for the repair call.
pub const REPAIR_SYSTEM: &str = "You are a Mermaid diagram syntax expert. Fix syntax errors \
and return only valid Mermaid code.";

/// Build the repair prompt from the broken diagram text and the renderer's
/// diagnostic. The rule list names the punctuation classes known to break
/// the grammar.
pub fn repair_prompt(broken: &str, diagnostic: &str) -> String {
    format!(
        "The Mermaid diagram has a syntax error. Please fix it and return ONLY the corrected \
         Mermaid code, nothing else.\n\n\
         Error message: {diagnostic}\n\n\
         Broken diagram:\n```mermaid\n{broken}\n```\n\n\
         Common fixes:\n\
         - Remove parentheses, hyphens, quotes and ampersands from labels, or wrap the label in quotes\n\
         - Use only alphanumeric characters for node IDs\n\
         - Ensure all node IDs are defined before being referenced\n\
         - Use proper syntax for node shapes: [] for rectangles, {{}} for diamonds\n\
         - Use proper arrow syntax: -->, --->, -.->\n\
         - Ensure proper indentation and spacing\n\n\
         Return ONLY the fixed Mermaid code without any explanation or markdown fences."
    )
}

// =============================================================================
// Workflow build
// =============================================================================

/// System framing for the workflow JSON build call.
pub const BUILD_SYSTEM: &str = "\
You are an expert n8n workflow automation designer and JSON generator.
CRITICAL INSTRUCTIONS FOR JSON OUTPUT:
1. You MUST respond with valid JSON only — no explanations, comments, or text
2. The JSON must conform exactly to n8n's workflow export format
3. Use double quotes throughout and proper syntax
4. All IDs must be unique UUIDs, timestamps in ISO 8601
5. Node types must use canonical n8n strings (e.g., \"n8n-nodes-base.manualTrigger\")
Root fields: name, nodes, connections, active, settings, versionId, id, createdAt, updatedAt";

/// Build the user prompt for workflow JSON generation from the design
/// transcript extracted out of the conversation window.
pub fn build_prompt(design_transcript: &str) -> String {
    format!(
        "Based on the following workflow discussion, generate a complete n8n workflow in \
         JSON format:\n\n{design_transcript}\n\n\
         Create a functional n8n workflow JSON that:\n\
         1. Implements the workflow design discussed\n\
         2. Uses appropriate n8n node types\n\
         3. Includes proper connections between nodes\n\
         4. Has realistic configuration for each node\n\
         5. Follows n8n best practices\n\n\
         Return ONLY the JSON, no other text or formatting."
    )
}

// =============================================================================
// Post-diagram explanation
// =============================================================================

/// System framing for the design-rationale explanation call.
pub const EXPLANATION_SYSTEM: &str = "You are a workflow automation expert speaking directly \
to a user. Use first person (I) and explain your design decisions confidently and personally.";

/// Prompt requesting a first-person rationale for the diagram just produced.
pub fn explanation_prompt() -> String {
    "Based on the workflow diagram that was just created, write a first-person explanation \
     directly to the user explaining:\n\
     1. Why I chose this specific workflow design for their needs\n\
     2. The intentional design decisions I made and why each step matters\n\
     3. How I applied n8n best practices in this design\n\
     4. What specific benefits they'll get from this approach\n\n\
     Write as \"I\" speaking directly to \"you\" — be conversational, educational, and \
     confident about the design choices. Maximum 3-4 paragraphs."
        .to_string()
}

/// Flatten the trailing window of the conversation into a role-tagged
/// transcript for the build prompt.
pub fn design_transcript(turns: &[ConversationTurn]) -> String {
    let start = turns.len().saturating_sub(PROMPT_WINDOW);
    turns[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Bounded trailing window of turns for a provider call.
pub fn prompt_window(turns: &[ConversationTurn]) -> &[ConversationTurn] {
    let start = turns.len().saturating_sub(PROMPT_WINDOW);
    &turns[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ConversationTurn;

    #[test]
    fn test_diagram_stages_share_instructions() {
        let ready = system_prompt_for(DialogueStage::ReadyForDiagram);
        let generated = system_prompt_for(DialogueStage::DiagramGenerated);
        assert_eq!(ready, generated);
        assert!(ready.contains("Mermaid"));
    }

    #[test]
    fn test_initial_prompt_asks_clarifying_questions() {
        let prompt = system_prompt_for(DialogueStage::Initial);
        assert!(prompt.contains("clarifying questions"));
        assert!(!prompt.contains("CRITICAL MERMAID SYNTAX RULES"));
    }

    #[test]
    fn test_repair_prompt_embeds_diagnostic_and_source() {
        let prompt = repair_prompt("graph TD\nA --> B(", "Parse error on line 2");
        assert!(prompt.contains("Parse error on line 2"));
        assert!(prompt.contains("A --> B("));
        assert!(prompt.contains("parentheses"));
        assert!(prompt.contains("alphanumeric"));
    }

    #[test]
    fn test_design_transcript_bounded_and_tagged() {
        let turns: Vec<ConversationTurn> = (0..15)
            .map(|i| ConversationTurn::user(format!("turn {i}")))
            .collect();
        let transcript = design_transcript(&turns);
        assert!(!transcript.contains("turn 4"));
        assert!(transcript.contains("user: turn 5"));
        assert!(transcript.contains("user: turn 14"));
    }

    #[test]
    fn test_prompt_window_keeps_last_ten() {
        let turns: Vec<ConversationTurn> = (0..12)
            .map(|i| ConversationTurn::assistant(format!("t{i}")))
            .collect();
        let window = prompt_window(&turns);
        assert_eq!(window.len(), PROMPT_WINDOW);
        assert_eq!(window[0].content, "t2");
    }
}
