//! Bounded evaluate-and-revise loop.
//!
//! The loop returns the last candidate once it scores at least the pass
//! score or once `max_iter` cycles have run, whichever comes first. A
//! candidate that never passes is still returned: best effort, not best
//! result.

use std::collections::BTreeMap;

use super::invoker::StageInvoker;
use super::prompt_templates::StageKind;
use super::PipelineError;
use crate::models::{CandidateArtifact, Evaluation, ParsedArtifact, RefinementSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineState {
    Evaluating,
    Revising,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    pub candidate: CandidateArtifact,
    pub summary: RefinementSummary,
}

pub struct RefinementLoop<'a> {
    invoker: &'a StageInvoker,
    max_iter: u32,
    pass_score: u8,
}

impl<'a> RefinementLoop<'a> {
    pub fn new(invoker: &'a StageInvoker, max_iter: u32, pass_score: u8) -> Self {
        Self {
            invoker,
            max_iter,
            pass_score,
        }
    }

    /// Refine `seed` against `original` for `goal`. Every revised candidate
    /// is stamped with `diet_label` and inherits the previous candidate's
    /// nutrition when the reviser omits it.
    pub async fn run(
        &self,
        original: &ParsedArtifact,
        seed: CandidateArtifact,
        goal: &str,
        diet_label: &str,
    ) -> Result<RefinementOutcome, PipelineError> {
        let original_json = serde_json::to_string(original)?;
        let mut candidate = seed;
        let mut cycles = 0u32;
        let mut revisions = 0u32;
        let mut last: Option<Evaluation> = None;
        let mut state = if self.max_iter == 0 {
            RefineState::Done
        } else {
            RefineState::Evaluating
        };

        while state != RefineState::Done {
            state = match state {
                RefineState::Evaluating => {
                    let evaluation = self.evaluate(&original_json, &candidate, goal).await?;
                    tracing::info!(cycle = cycles + 1, score = evaluation.score, "candidate evaluated");
                    let passed = evaluation.score >= self.pass_score;
                    last = Some(evaluation);
                    if passed {
                        RefineState::Done
                    } else {
                        RefineState::Revising
                    }
                }
                RefineState::Revising => {
                    let (suggestions, rationale) = match &last {
                        Some(e) => (e.improvement_suggestions.clone(), e.rationale.clone()),
                        None => (Vec::new(), String::new()),
                    };
                    let revised = self
                        .revise(&original_json, &candidate, goal, &suggestions, &rationale)
                        .await?;
                    candidate = revised
                        .inheriting_nutrition(candidate.nutrition.as_ref())
                        .with_diet_label(diet_label);
                    revisions += 1;
                    cycles += 1;
                    if cycles >= self.max_iter {
                        tracing::info!(cycles, "refinement bound reached");
                        RefineState::Done
                    } else {
                        RefineState::Evaluating
                    }
                }
                RefineState::Done => RefineState::Done,
            };
        }

        let last_score = last.as_ref().map(|e| e.score);
        let passed = last_score.is_some_and(|s| s >= self.pass_score);

        Ok(RefinementOutcome {
            candidate,
            summary: RefinementSummary {
                revisions,
                last_score,
                passed,
            },
        })
    }

    async fn evaluate(
        &self,
        original_json: &str,
        candidate: &CandidateArtifact,
        goal: &str,
    ) -> Result<Evaluation, PipelineError> {
        let variables = BTreeMap::from([
            ("original_recipe", original_json.to_string()),
            ("optimized_recipe", serde_json::to_string(candidate)?),
            ("goal", goal.to_string()),
        ]);
        Ok(self.invoker.invoke(StageKind::Evaluate, &variables).await?.value)
    }

    async fn revise(
        &self,
        original_json: &str,
        candidate: &CandidateArtifact,
        goal: &str,
        suggestions: &[String],
        rationale: &str,
    ) -> Result<CandidateArtifact, PipelineError> {
        let variables = BTreeMap::from([
            ("original_recipe", original_json.to_string()),
            ("current_recipe", serde_json::to_string(candidate)?),
            ("goal", goal.to_string()),
            ("improvement_suggestions", serde_json::to_string(suggestions)?),
            ("evaluator_feedback", rationale.to_string()),
        ]);
        Ok(self.invoker.invoke(StageKind::Revise, &variables).await?.value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::models::NutritionEstimate;
    use crate::pipeline::llm::ScriptedLlmClient;
    use crate::pipeline::storage::InMemoryAuditSink;

    fn recipe(title: &str) -> CandidateArtifact {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "ingredients": [{"name": "flour", "quantity": "2", "unit": "cups"}],
            "steps": ["Mix.", "Bake."]
        }))
        .unwrap()
    }

    fn revision(title: &str) -> String {
        serde_json::to_string(&recipe(title)).unwrap()
    }

    fn score(n: u8) -> String {
        format!(r#"{{"score": {n}, "rationale": "try less sugar", "improvement_suggestions": ["swap sugar"]}}"#)
    }

    fn seed() -> CandidateArtifact {
        recipe("Seed")
            .with_nutrition(NutritionEstimate {
                sugar_g: Some(12.8),
                ..Default::default()
            })
            .with_diet_label("low-sugar")
    }

    async fn run_loop(client: ScriptedLlmClient, max_iter: u32) -> (RefinementOutcome, Arc<ScriptedLlmClient>, Arc<InMemoryAuditSink>) {
        let client = Arc::new(client);
        let audit = Arc::new(InMemoryAuditSink::new());
        let invoker = StageInvoker::new(client.clone(), audit.clone(), Uuid::new_v4());
        let outcome = RefinementLoop::new(&invoker, max_iter, 8)
            .run(&recipe("Original"), seed(), "lower sugar", "low-sugar")
            .await
            .unwrap();
        (outcome, client, audit)
    }

    #[tokio::test]
    async fn zero_bound_returns_seed_untouched() {
        let (outcome, client, audit) = run_loop(ScriptedLlmClient::new(), 0).await;

        assert_eq!(outcome.candidate, seed());
        assert_eq!(outcome.summary.revisions, 0);
        assert_eq!(outcome.summary.last_score, None);
        assert!(client.calls().is_empty());
        assert_eq!(audit.count(), 0);
    }

    #[tokio::test]
    async fn passing_first_evaluation_makes_no_revision() {
        let (outcome, client, _) =
            run_loop(ScriptedLlmClient::new().respond("evaluate", &score(9)), 3).await;

        assert_eq!(outcome.candidate, seed());
        assert!(outcome.summary.passed);
        assert_eq!(client.call_count("revise"), 0);
    }

    #[tokio::test]
    async fn scores_seven_seven_nine_run_two_revisions() {
        let client = ScriptedLlmClient::new()
            .respond("evaluate", &score(7))
            .respond("evaluate", &score(7))
            .respond("evaluate", &score(9))
            .respond("revise", &revision("First revision"))
            .respond("revise", &revision("Second revision"));

        let (outcome, client, audit) = run_loop(client, 3).await;

        assert_eq!(outcome.summary.revisions, 2);
        assert_eq!(outcome.summary.last_score, Some(9));
        assert!(outcome.summary.passed);
        assert_eq!(outcome.candidate.title, "Second revision");
        assert_eq!(client.call_count("evaluate"), 3);
        assert_eq!(client.call_count("revise"), 2);
        assert_eq!(
            audit.stages(),
            vec!["evaluate", "revise", "evaluate", "revise", "evaluate"]
        );
    }

    #[tokio::test]
    async fn never_exceeds_the_bound() {
        let client = ScriptedLlmClient::new()
            .respond("evaluate", &score(3))
            .respond("revise", &revision("Still not great"));

        let (outcome, client, _) = run_loop(client, 3).await;

        assert_eq!(outcome.summary.revisions, 3);
        assert!(!outcome.summary.passed);
        assert_eq!(outcome.candidate.title, "Still not great");
        assert_eq!(client.call_count("evaluate"), 3);
        assert_eq!(client.call_count("revise"), 3);
    }

    #[tokio::test]
    async fn revision_inherits_nutrition_and_diet_label() {
        let client = ScriptedLlmClient::new()
            .respond("evaluate", &score(5))
            .respond("revise", &revision("Revised"));

        let (outcome, _, _) = run_loop(client, 1).await;

        assert_eq!(outcome.candidate.diet_label.as_deref(), Some("low-sugar"));
        assert_eq!(outcome.candidate.nutrition.and_then(|n| n.sugar_g), Some(12.8));
    }

    #[tokio::test]
    async fn reviser_sees_evaluator_feedback() {
        let client = ScriptedLlmClient::new()
            .respond("evaluate", &score(4))
            .respond("revise", &revision("Revised"));

        let (_, client, _) = run_loop(client, 1).await;

        let revise_call = client
            .calls()
            .into_iter()
            .find(|c| c.template_id == "revise")
            .unwrap();
        assert!(revise_call.prompt.contains("swap sugar"));
        assert!(revise_call.prompt.contains("try less sugar"));
    }

    #[tokio::test]
    async fn evaluator_failure_fails_the_loop() {
        let client = Arc::new(ScriptedLlmClient::new().respond("evaluate", r#"{"score": "excellent"}"#));
        let audit = Arc::new(InMemoryAuditSink::new());
        let invoker = StageInvoker::new(client.clone(), audit, Uuid::new_v4());

        let err = RefinementLoop::new(&invoker, 3, 8)
            .run(&recipe("Original"), seed(), "lower sugar", "low-sugar")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MalformedOutput { ref stage, .. } if stage == "evaluate"));
    }
}
