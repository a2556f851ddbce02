//! Diagram healing: render, detect failure, request a model repair, retry —
//! bounded by a fixed attempt budget with distinct terminal states.
//!
//! The loop is explicit (not recursive) so the bound on iterations is
//! structurally obvious and the call stack stays flat no matter how often
//! the repair keeps reintroducing broken syntax.

use std::sync::Arc;

use super::renderer::DiagramRenderer;
use super::repair::RepairRequester;
use super::types::{AttemptStatus, DiagramAttempt, RenderedDiagram};

/// Maximum repair attempts per diagram instance. The bound is per-diagram,
/// not global; a fresh diagram starts with a full budget.
pub const MAX_REPAIR_ATTEMPTS: u32 = 3;

/// Diagnostic attached when the user re-enters the loop by hand.
pub const MANUAL_RETRY_DIAGNOSTIC: &str = "Manual retry requested";

// =============================================================================
// Observable progress and outcomes
// =============================================================================

/// Progress notifications emitted while a healing sequence runs, so a front
/// end can show the loading → healing → terminal progression.
#[derive(Debug, Clone, PartialEq)]
pub enum HealProgress {
    /// A render call is about to be issued.
    Rendering { attempt: u32 },
    /// The render failed and an automatic fix is being requested.
    AutoFixing { attempt: u32, max: u32 },
}

/// Why a sequence ended in `Exhausted`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExhaustReason {
    /// Every attempt up to the budget failed to render.
    AttemptsExhausted,
    /// The repair request itself failed (network, status, or envelope);
    /// no new candidate text was produced, so no attempt slot was consumed.
    RepairRequestFailed(String),
}

/// Manual-retry affordance surfaced with a terminal failure. Bound to the
/// diagram's original text so retrying starts over from what the model
/// first produced, not from a half-mangled repair.
#[derive(Debug, Clone)]
pub struct ManualRetry {
    pub source_text: String,
    pub diagnostic: String,
}

impl ManualRetry {
    /// Re-seed a fresh attempt at `attempt_number = 0`.
    pub fn reseed(&self) -> DiagramAttempt {
        let mut attempt = DiagramAttempt::new(self.source_text.clone());
        attempt.last_error = Some(self.diagnostic.clone());
        attempt
    }
}

/// Terminal result of one healing sequence.
#[derive(Debug, Clone)]
pub enum HealOutcome {
    /// The diagram rendered; the artifact carries a click-to-expand hint.
    Rendered {
        artifact: RenderedDiagram,
        expandable: bool,
    },
    /// The sequence gave up. `notice` is the plain-language message to show;
    /// `retry` re-enters the loop on demand.
    Exhausted {
        reason: ExhaustReason,
        notice: String,
        retry: ManualRetry,
    },
}

impl HealOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, HealOutcome::Rendered { .. })
    }
}

// =============================================================================
// DiagramHealer
// =============================================================================

/// Drives the render → repair → re-render loop for one diagram at a time.
///
/// Within a sequence the calls are strictly sequential: a repair is never
/// issued before its predecessor render's failure is known, and a re-render
/// never before the repair completes. Independent diagrams hold independent
/// [`DiagramAttempt`] state and may interleave freely.
pub struct DiagramHealer {
    renderer: Arc<dyn DiagramRenderer>,
    repairer: Arc<dyn RepairRequester>,
    max_attempts: u32,
}

impl DiagramHealer {
    pub fn new(renderer: Arc<dyn DiagramRenderer>, repairer: Arc<dyn RepairRequester>) -> Self {
        Self {
            renderer,
            repairer,
            max_attempts: MAX_REPAIR_ATTEMPTS,
        }
    }

    /// Override the attempt budget (tests exercise smaller bounds).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Run a healing sequence to a terminal state, without progress reporting.
    pub async fn heal(&self, attempt: &mut DiagramAttempt) -> HealOutcome {
        self.heal_with(attempt, |_| {}).await
    }

    /// Run a healing sequence, reporting progress through `observe`.
    ///
    /// `attempt.attempt_number` counts repair attempts consumed and never
    /// exceeds the budget. Transitions follow
    /// `Pending → (Rendered | Failed)`, `Failed → Pending` via repair, and
    /// `Failed → Exhausted` when the budget is spent or the repair request
    /// itself fails.
    pub async fn heal_with<F>(&self, attempt: &mut DiagramAttempt, mut observe: F) -> HealOutcome
    where
        F: FnMut(HealProgress) + Send,
    {
        loop {
            attempt.status = AttemptStatus::Pending;
            observe(HealProgress::Rendering {
                attempt: attempt.attempt_number,
            });

            let diagnostic = match self.renderer.render(&attempt.source_text).await {
                Ok(artifact) => {
                    attempt.status = AttemptStatus::Rendered;
                    attempt.last_error = None;
                    tracing::debug!(
                        diagram_id = %attempt.id,
                        attempts = attempt.attempt_number,
                        "Diagram rendered",
                    );
                    return HealOutcome::Rendered {
                        artifact,
                        expandable: true,
                    };
                }
                Err(diag) => diag.message,
            };

            attempt.status = AttemptStatus::Failed;
            attempt.last_error = Some(diagnostic.clone());

            if attempt.attempt_number >= self.max_attempts {
                attempt.status = AttemptStatus::Exhausted;
                tracing::warn!(
                    diagram_id = %attempt.id,
                    attempts = attempt.attempt_number,
                    "Healing exhausted: diagram needs manual correction",
                );
                return HealOutcome::Exhausted {
                    reason: ExhaustReason::AttemptsExhausted,
                    notice: "Unable to render diagram. The diagram syntax needs manual \
                             correction."
                        .into(),
                    retry: self.manual_retry_for(attempt),
                };
            }

            observe(HealProgress::AutoFixing {
                attempt: attempt.attempt_number + 1,
                max: self.max_attempts,
            });

            match self
                .repairer
                .request_repair(&attempt.source_text, &diagnostic)
                .await
            {
                Ok(repaired) => {
                    attempt.attempt_number += 1;
                    attempt.source_text = repaired;
                }
                Err(e) => {
                    // No candidate text was produced — escalate without
                    // consuming an attempt slot.
                    attempt.status = AttemptStatus::Exhausted;
                    tracing::warn!(
                        diagram_id = %attempt.id,
                        error = %e,
                        "Repair request failed, healing terminated",
                    );
                    return HealOutcome::Exhausted {
                        reason: ExhaustReason::RepairRequestFailed(e.to_string()),
                        notice: "Could not auto-fix diagram. Please try rephrasing your \
                                 request."
                            .into(),
                        retry: self.manual_retry_for(attempt),
                    };
                }
            }
        }
    }

    /// Re-enter the loop from a manual-retry affordance: a fresh attempt is
    /// seeded at `attempt_number = 0` from the original text.
    pub async fn manual_retry<F>(&self, retry: &ManualRetry, observe: F) -> (DiagramAttempt, HealOutcome)
    where
        F: FnMut(HealProgress) + Send,
    {
        let mut attempt = retry.reseed();
        let outcome = self.heal_with(&mut attempt, observe).await;
        (attempt, outcome)
    }

    fn manual_retry_for(&self, attempt: &DiagramAttempt) -> ManualRetry {
        ManualRetry {
            source_text: attempt.original_text.clone(),
            diagnostic: MANUAL_RETRY_DIAGNOSTIC.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::renderer::{FlowchartChecker, RenderDiagnostic};
    use crate::error::AppError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Renderer that fails the first `fail_count` calls, then succeeds.
    struct ScriptedRenderer {
        fail_count: usize,
        calls: AtomicUsize,
    }

    impl ScriptedRenderer {
        fn failing_first(fail_count: usize) -> Self {
            Self {
                fail_count,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DiagramRenderer for ScriptedRenderer {
        async fn render(&self, source: &str) -> Result<RenderedDiagram, RenderDiagnostic> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_count {
                Err(RenderDiagnostic::new("Parse error"))
            } else {
                Ok(RenderedDiagram {
                    source: source.to_string(),
                    payload: "ok".into(),
                })
            }
        }
    }

    /// Repairer that appends a marker so each candidate is distinguishable.
    struct MarkingRepairer {
        calls: AtomicUsize,
    }

    impl MarkingRepairer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RepairRequester for MarkingRepairer {
        async fn request_repair(&self, broken: &str, _diag: &str) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{broken}!"))
        }
    }

    /// Repairer that removes parentheses from the diagram text, the way the
    /// model fixes the most common label mistake.
    struct ParenStrippingRepairer;

    #[async_trait]
    impl RepairRequester for ParenStrippingRepairer {
        async fn request_repair(&self, broken: &str, _diag: &str) -> Result<String, AppError> {
            Ok(broken.replace(['(', ')'], ""))
        }
    }

    /// Repairer whose request always fails at the transport level.
    struct FailingRepairer;

    #[async_trait]
    impl RepairRequester for FailingRepairer {
        async fn request_repair(&self, _broken: &str, _diag: &str) -> Result<String, AppError> {
            Err(AppError::RepairRequest("connection refused".into()))
        }
    }

    fn healer(
        renderer: Arc<ScriptedRenderer>,
        repairer: Arc<MarkingRepairer>,
    ) -> DiagramHealer {
        DiagramHealer::new(renderer, repairer)
    }

    #[tokio::test]
    async fn test_first_render_success_makes_no_repair_calls() {
        let renderer = Arc::new(ScriptedRenderer::failing_first(0));
        let repairer = Arc::new(MarkingRepairer::new());
        let h = healer(renderer.clone(), repairer.clone());

        let mut attempt = DiagramAttempt::new("graph TD\n    A --> B");
        let outcome = h.heal(&mut attempt).await;

        assert!(outcome.is_rendered());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repairer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(attempt.status, AttemptStatus::Rendered);
        assert_eq!(attempt.attempt_number, 0);
        assert!(attempt.last_error.is_none());
    }

    #[tokio::test]
    async fn test_k_failures_then_success_issues_k_repairs() {
        for k in 1..MAX_REPAIR_ATTEMPTS as usize {
            let renderer = Arc::new(ScriptedRenderer::failing_first(k));
            let repairer = Arc::new(MarkingRepairer::new());
            let h = healer(renderer.clone(), repairer.clone());

            let mut attempt = DiagramAttempt::new("broken");
            let outcome = h.heal(&mut attempt).await;

            assert!(outcome.is_rendered(), "k={k}");
            assert_eq!(renderer.calls.load(Ordering::SeqCst), k + 1);
            assert_eq!(repairer.calls.load(Ordering::SeqCst), k);
            assert_eq!(attempt.attempt_number, k as u32);
        }
    }

    #[tokio::test]
    async fn test_parenthesized_label_heals_in_one_repair() {
        // Full loop against the real checker: the parenthesized label fails
        // with a parse diagnostic, one repair strips the parentheses, and
        // the re-render succeeds.
        let h = DiagramHealer::new(Arc::new(FlowchartChecker), Arc::new(ParenStrippingRepairer));

        let mut attempt = DiagramAttempt::new("graph TD\n    A[Send (email)] --> B[Done]");
        let outcome = h.heal(&mut attempt).await;

        assert!(outcome.is_rendered());
        assert_eq!(attempt.status, AttemptStatus::Rendered);
        assert_eq!(attempt.attempt_number, 1);
        assert!(attempt.last_error.is_none());
        assert!(!attempt.source_text.contains('('));
        // The original text stays pinned for manual retry.
        assert!(attempt.original_text.contains("(email)"));
    }

    #[tokio::test]
    async fn test_all_failures_exhaust_after_budget() {
        let renderer = Arc::new(ScriptedRenderer::failing_first(usize::MAX));
        let repairer = Arc::new(MarkingRepairer::new());
        let h = healer(renderer.clone(), repairer.clone());

        let mut attempt = DiagramAttempt::new("broken");
        let outcome = h.heal(&mut attempt).await;

        // M repair calls, M+1 render calls, then the terminal failure state.
        assert_eq!(
            renderer.calls.load(Ordering::SeqCst),
            MAX_REPAIR_ATTEMPTS as usize + 1
        );
        assert_eq!(
            repairer.calls.load(Ordering::SeqCst),
            MAX_REPAIR_ATTEMPTS as usize
        );
        assert_eq!(attempt.status, AttemptStatus::Exhausted);
        assert_eq!(attempt.attempt_number, MAX_REPAIR_ATTEMPTS);

        match outcome {
            HealOutcome::Exhausted { reason, retry, .. } => {
                assert_eq!(reason, ExhaustReason::AttemptsExhausted);
                // Bound to the original text, not the last repair candidate.
                assert_eq!(retry.source_text, "broken");
                assert_eq!(retry.diagnostic, MANUAL_RETRY_DIAGNOSTIC);
            }
            HealOutcome::Rendered { .. } => panic!("expected exhausted"),
        }
    }

    #[tokio::test]
    async fn test_repair_failure_escalates_without_consuming_slot() {
        let renderer = Arc::new(ScriptedRenderer::failing_first(usize::MAX));
        let h = DiagramHealer::new(renderer.clone(), Arc::new(FailingRepairer));

        let mut attempt = DiagramAttempt::new("broken");
        let outcome = h.heal(&mut attempt).await;

        // One render, one failed repair, straight to exhausted.
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(attempt.status, AttemptStatus::Exhausted);
        assert_eq!(attempt.attempt_number, 0);
        match outcome {
            HealOutcome::Exhausted { reason, .. } => {
                assert!(matches!(reason, ExhaustReason::RepairRequestFailed(_)));
            }
            HealOutcome::Rendered { .. } => panic!("expected exhausted"),
        }
    }

    #[tokio::test]
    async fn test_manual_retry_reseeds_at_zero_and_can_render() {
        let retry = ManualRetry {
            source_text: "graph TD\n    A --> B".into(),
            diagnostic: MANUAL_RETRY_DIAGNOSTIC.into(),
        };

        // Renderer now succeeds.
        let renderer = Arc::new(ScriptedRenderer::failing_first(0));
        let h = healer(renderer, Arc::new(MarkingRepairer::new()));

        let (attempt, outcome) = h.manual_retry(&retry, |_| {}).await;
        assert!(outcome.is_rendered());
        assert_eq!(attempt.attempt_number, 0);
        assert_eq!(attempt.status, AttemptStatus::Rendered);
    }

    #[tokio::test]
    async fn test_progress_sequence_for_one_heal_cycle() {
        let renderer = Arc::new(ScriptedRenderer::failing_first(1));
        let h = healer(renderer, Arc::new(MarkingRepairer::new()));

        let events = Mutex::new(Vec::new());
        let mut attempt = DiagramAttempt::new("broken");
        let outcome = h
            .heal_with(&mut attempt, |p| events.lock().unwrap().push(p))
            .await;

        assert!(outcome.is_rendered());
        let events = events.into_inner().unwrap();
        assert_eq!(
            events,
            vec![
                HealProgress::Rendering { attempt: 0 },
                HealProgress::AutoFixing {
                    attempt: 1,
                    max: MAX_REPAIR_ATTEMPTS
                },
                HealProgress::Rendering { attempt: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_repaired_text_feeds_the_next_render() {
        let renderer = Arc::new(ScriptedRenderer::failing_first(2));
        let repairer = Arc::new(MarkingRepairer::new());
        let h = healer(renderer, repairer);

        let mut attempt = DiagramAttempt::new("x");
        let _ = h.heal(&mut attempt).await;
        // Two repairs appended two markers.
        assert_eq!(attempt.source_text, "x!!");
        assert_eq!(attempt.original_text, "x");
    }
}
