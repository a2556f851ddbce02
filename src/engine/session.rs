//! Planner session: owns the conversation history, the dialogue stage, and
//! the generation counter that guards against dangling async updates.
//!
//! All mutable dialogue state lives on this object; callers hold a session
//! per conversation rather than sharing globals.

use std::sync::Arc;

use crate::error::AppError;

use super::prompt;
use super::provider::GenerativeProvider;
use super::stage::{self, SplitReply};
use super::types::{ConversationTurn, DiagramAttempt, DialogueStage};

/// Outcome of processing one user message.
#[derive(Debug)]
pub struct SessionReply {
    /// Generation the reply belongs to. Stale replies (a reset happened while
    /// the provider call was in flight) must be discarded by the caller.
    pub generation: u64,
    /// Stage after the reply was applied.
    pub stage: DialogueStage,
    /// Prose before the diagram block, if any.
    pub before: String,
    /// Prose after the diagram block.
    pub after: String,
    /// Freshly seeded attempt when the reply carried a diagram. The caller
    /// hands it to the healing loop.
    pub diagram: Option<DiagramAttempt>,
}

pub struct PlannerSession {
    provider: Arc<dyn GenerativeProvider>,
    history: Vec<ConversationTurn>,
    stage: DialogueStage,
    clarifications: u32,
    generation: u64,
}

impl PlannerSession {
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self {
            provider,
            history: Vec::new(),
            stage: DialogueStage::Initial,
            clarifications: 0,
            generation: 0,
        }
    }

    pub fn stage(&self) -> DialogueStage {
        self.stage
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether an update tagged with `generation` still applies to this
    /// session's current conversation.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Start the conversation over. Bumps the generation so in-flight work
    /// from the previous conversation can no longer apply its result.
    pub fn reset(&mut self) {
        self.history.clear();
        self.stage = DialogueStage::Initial;
        self.clarifications = 0;
        self.generation += 1;
        tracing::info!(generation = self.generation, "Session reset");
    }

    /// Process one user message: record it, query the provider with the
    /// stage-appropriate framing, split the reply around a diagram block,
    /// and advance the stage.
    pub async fn handle_message(&mut self, message: &str) -> Result<SessionReply, AppError> {
        crate::validation::require_non_empty("message", message)?;

        let generation = self.generation;
        self.history.push(ConversationTurn::user(message));

        // Framing follows the stage as it stood before this exchange; the
        // stage advances only once the reply is known.
        let system = prompt::system_prompt_for(self.stage);
        let window = prompt::prompt_window(&self.history);
        let reply = self.provider.complete(&system, window).await?;

        Ok(self.apply_reply(generation, &reply))
    }

    fn apply_reply(&mut self, generation: u64, reply: &str) -> SessionReply {
        let SplitReply { before, diagram, after } = stage::split_reply(reply);

        if diagram.is_none() {
            self.clarifications += 1;
        }
        self.stage = stage::next_stage(self.stage, self.clarifications, diagram.is_some());
        self.history.push(ConversationTurn::assistant(reply));

        tracing::debug!(
            stage = self.stage.as_str(),
            clarifications = self.clarifications,
            has_diagram = diagram.is_some(),
            "Reply applied",
        );

        SessionReply {
            generation,
            stage: self.stage,
            before,
            after,
            diagram: diagram.map(DiagramAttempt::new),
        }
    }

    /// Request a first-person rationale for the diagram just produced. The
    /// explanation is appended to the history like any assistant reply.
    pub async fn request_explanation(&mut self) -> Result<String, AppError> {
        let start = self.history.len().saturating_sub(prompt::EXPLANATION_WINDOW);
        let mut window: Vec<ConversationTurn> = self.history[start..].to_vec();
        window.push(ConversationTurn::user(prompt::explanation_prompt()));

        let explanation = self
            .provider
            .complete(prompt::EXPLANATION_SYSTEM, &window)
            .await?;
        self.history.push(ConversationTurn::assistant(&explanation));
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays a queue of scripted replies.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl GenerativeProvider for ScriptedProvider {
        fn provider_name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(
            &self,
            _system: &str,
            _turns: &[ConversationTurn],
        ) -> Result<String, AppError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Provider("script exhausted".into()))
        }
    }

    const DIAGRAM_REPLY: &str =
        "Here is your workflow:\n```mermaid\ngraph TD\n    A --> B\n```\nShall I adjust it?";

    #[tokio::test]
    async fn test_invoice_conversation_walks_the_stages() {
        let provider = ScriptedProvider::new(&[
            "Which invoicing tool do you use, and does it have an API?",
            "Got it. How many invoices per week?",
            DIAGRAM_REPLY,
        ]);
        let mut session = PlannerSession::new(provider);
        assert_eq!(session.stage(), DialogueStage::Initial);

        let r1 = session
            .handle_message("I want to automate my invoice emails")
            .await
            .unwrap();
        assert_eq!(r1.stage, DialogueStage::Clarifying);
        assert!(r1.diagram.is_none());

        let r2 = session.handle_message("We use QuickBooks").await.unwrap();
        assert_eq!(r2.stage, DialogueStage::ReadyForDiagram);

        let r3 = session.handle_message("About 50 a week").await.unwrap();
        assert_eq!(r3.stage, DialogueStage::DiagramGenerated);
        let attempt = r3.diagram.expect("diagram attempt seeded");
        assert_eq!(attempt.source_text, "graph TD\n    A --> B");
        assert_eq!(attempt.attempt_number, 0);
        assert_eq!(r3.before, "Here is your workflow:");
        assert_eq!(r3.after, "Shall I adjust it?");

        // History holds the full exchange in order.
        assert_eq!(session.history().len(), 6);
    }

    #[tokio::test]
    async fn test_early_diagram_jumps_to_terminal_stage() {
        let provider = ScriptedProvider::new(&[DIAGRAM_REPLY]);
        let mut session = PlannerSession::new(provider);
        let reply = session.handle_message("simple two step flow").await.unwrap();
        assert_eq!(reply.stage, DialogueStage::DiagramGenerated);
        assert!(reply.diagram.is_some());
    }

    #[tokio::test]
    async fn test_reset_bumps_generation_and_clears_state() {
        let provider = ScriptedProvider::new(&["Which tool do you use?"]);
        let mut session = PlannerSession::new(provider);

        let reply = session.handle_message("automate reports").await.unwrap();
        let before_reset = reply.generation;
        assert!(session.is_current(before_reset));

        session.reset();
        assert!(!session.is_current(before_reset));
        assert_eq!(session.stage(), DialogueStage::Initial);
        assert!(session.history().is_empty());
        assert_eq!(session.generation(), before_reset + 1);
    }

    #[tokio::test]
    async fn test_blank_message_rejected_before_provider_call() {
        let provider = ScriptedProvider::new(&["never returned"]);
        let mut session = PlannerSession::new(provider);

        let err = session.handle_message("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("message"));
        // Nothing was recorded and the scripted reply was not consumed.
        assert!(session.history().is_empty());
        assert_eq!(session.stage(), DialogueStage::Initial);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_user_turn_but_not_stage() {
        let provider = ScriptedProvider::new(&[]);
        let mut session = PlannerSession::new(provider);
        let err = session.handle_message("hello").await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
        assert_eq!(session.stage(), DialogueStage::Initial);
        assert_eq!(session.history().len(), 1);
    }
}
