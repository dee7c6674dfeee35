//! Pipeline coordinator.
//!
//! Parse → Classify → Enrich (fan-out) → Synthesize → Refine → MacroDelta
//! → Normalize → Index. Every stage runs through one [`StageInvoker`] bound
//! to the document id, so the audit trail of a run is keyed by that id.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::Instrument;

use super::enrich::enrich;
use super::invoker::StageInvoker;
use super::llm::GenerativeClient;
use super::normalize::{normalize_recipe, validate};
use super::prompt_templates::{normalize_diet_label, StageKind, DIET_LABELS};
use super::refine::RefinementLoop;
use super::storage::{AuditSink, IndexLabels, VectorIndexer};
use super::PipelineError;
use crate::config::PipelineConfig;
use crate::models::{
    Badges, CandidateArtifact, FinalResult, MacroDelta, OptimizedRecipe, ParsedArtifact,
    RawDocument,
};

#[derive(Debug, Deserialize)]
struct DietLabelReply {
    diet_label: String,
}

/// Runs documents through the full optimization pipeline.
///
/// Holds no per-document state; one instance serves concurrent runs.
pub struct RecipePipeline {
    client: Arc<dyn GenerativeClient>,
    audit: Arc<dyn AuditSink>,
    indexer: Arc<dyn VectorIndexer>,
    config: PipelineConfig,
}

impl RecipePipeline {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        audit: Arc<dyn AuditSink>,
        indexer: Arc<dyn VectorIndexer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            audit,
            indexer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, raw_text: &str, goal: &str) -> Result<FinalResult, PipelineError> {
        self.run_document(RawDocument::new(raw_text, goal)).await
    }

    /// Run one submitted document. Dropping the returned future stops the
    /// pipeline before its next stage.
    pub async fn run_document(&self, document: RawDocument) -> Result<FinalResult, PipelineError> {
        let span = tracing::info_span!("run_pipeline", doc_id = %document.id);
        self.execute(&document).instrument(span).await
    }

    async fn execute(&self, document: &RawDocument) -> Result<FinalResult, PipelineError> {
        if document.text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        tracing::info!(
            text_chars = document.text.len(),
            goal_chars = document.goal.len(),
            model = self.client.model_name(),
            "pipeline started"
        );

        let invoker = StageInvoker::new(self.client.clone(), self.audit.clone(), document.id);
        let goal = document.goal.as_str();

        // Step 1: Parse
        let parsed = self.parse(&invoker, &document.text).await?;
        tracing::info!(
            ingredients = parsed.ingredients.len(),
            steps = parsed.steps.len(),
            "recipe parsed"
        );

        // Step 2: Classify diet label
        let diet_label = self.classify(&invoker, &parsed, goal).await?;
        tracing::info!(diet_label = %diet_label, "diet label chosen");

        // Step 3: Enrichment fan-out, then attach nutrition to the original
        let bundle = enrich(&invoker, &parsed).await?;
        let original = parsed.with_nutrition(bundle.nutrition.clone());

        // Step 4: Synthesize the first candidate
        let seed = self
            .synthesize(&invoker, &original, goal, &diet_label, &bundle)
            .await?
            .inheriting_nutrition(original.nutrition.as_ref())
            .with_diet_label(&diet_label);

        // Step 5: Refinement loop
        let outcome = RefinementLoop::new(&invoker, self.config.max_iter, self.config.pass_score)
            .run(&original, seed, goal, &diet_label)
            .await?;
        let candidate = outcome.candidate;

        // Step 6: Delta, normalization, validation
        let macros_delta = MacroDelta::between(original.nutrition.as_ref(), candidate.nutrition.as_ref());
        let original_content = normalize_recipe(&original);
        validate(&original_content, "original")?;
        let optimized_content = normalize_recipe(&candidate);
        validate(&optimized_content, "optimized")?;

        let result = FinalResult {
            document_id: document.id,
            original: original_content,
            optimized: OptimizedRecipe {
                content: optimized_content,
                improvements: candidate.improvements,
            },
            diet_label,
            badges: Badges {
                allergens: bundle.allergens.allergens,
                macros_delta,
            },
            refinement: outcome.summary,
        };

        // Step 7: Best-effort indexing
        self.index(&result, goal).await;

        tracing::info!(
            revisions = result.refinement.revisions,
            last_score = ?result.refinement.last_score,
            "pipeline complete"
        );
        Ok(result)
    }

    async fn parse(&self, invoker: &StageInvoker, text: &str) -> Result<ParsedArtifact, PipelineError> {
        let variables = BTreeMap::from([("recipe_text", text.to_string())]);
        Ok(invoker.invoke(StageKind::Parse, &variables).await?.value)
    }

    async fn classify(
        &self,
        invoker: &StageInvoker,
        parsed: &ParsedArtifact,
        goal: &str,
    ) -> Result<String, PipelineError> {
        let variables = BTreeMap::from([
            ("recipe_json", serde_json::to_string(parsed)?),
            ("goal", goal.to_string()),
            ("diet_labels", DIET_LABELS.join(", ")),
        ]);
        let reply: DietLabelReply = invoker.invoke(StageKind::Classify, &variables).await?.value;
        let label = normalize_diet_label(&reply.diet_label);
        if label != reply.diet_label.trim().to_lowercase() {
            tracing::debug!(label = %label, "classifier label normalized");
        }
        Ok(label)
    }

    async fn synthesize(
        &self,
        invoker: &StageInvoker,
        original: &ParsedArtifact,
        goal: &str,
        diet_label: &str,
        bundle: &crate::models::EnrichmentBundle,
    ) -> Result<CandidateArtifact, PipelineError> {
        let variables = BTreeMap::from([
            ("recipe_json", serde_json::to_string(original)?),
            ("goal", goal.to_string()),
            ("diet_label", diet_label.to_string()),
            ("nutrition_info", serde_json::to_string(&bundle.nutrition)?),
            ("allergen_info", serde_json::to_string(&bundle.allergens)?),
            ("flavor_profile", serde_json::to_string(&bundle.flavor)?),
        ]);
        Ok(invoker.invoke(StageKind::Synthesize, &variables).await?.value)
    }

    /// Failures are logged and swallowed; indexing never fails a run.
    async fn index(&self, result: &FinalResult, goal: &str) {
        let payloads = serde_json::to_value(&result.original)
            .and_then(|original| Ok((original, serde_json::to_value(&result.optimized)?)));
        let (original, optimized) = match payloads {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "index payload serialization failed, skipping");
                return;
            }
        };
        let labels = IndexLabels {
            document_id: result.document_id,
            diet_label: result.diet_label.clone(),
            title: result.original.title.clone(),
            optimized_title: result.optimized.content.title.clone(),
        };
        if let Err(e) = self.indexer.index(&original, &optimized, goal, &labels).await {
            tracing::warn!(error = %e, "vector indexing failed, result still returned");
        }
    }
}
