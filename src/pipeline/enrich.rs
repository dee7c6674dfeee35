//! Enrichment fan-out: nutrition, allergen and flavor annotations requested
//! concurrently against the same parsed recipe.

use std::collections::BTreeMap;

use super::invoker::StageInvoker;
use super::prompt_templates::StageKind;
use super::PipelineError;
use crate::models::{AllergenSet, EnrichmentBundle, FlavorProfile, NutritionEstimate, ParsedArtifact};

/// Run the three enrichers and join them.
///
/// All three must succeed. The first permanent failure is returned and
/// the remaining calls are dropped; there is no partial bundle.
pub async fn enrich(invoker: &StageInvoker, parsed: &ParsedArtifact) -> Result<EnrichmentBundle, PipelineError> {
    let variables = BTreeMap::from([("recipe_json", serde_json::to_string(parsed)?)]);

    let (nutrition, allergens, flavor) = tokio::try_join!(
        invoker.invoke::<NutritionEstimate>(StageKind::Nutrition, &variables),
        invoker.invoke::<AllergenSet>(StageKind::Allergen, &variables),
        invoker.invoke::<FlavorProfile>(StageKind::Flavor, &variables),
    )?;

    tracing::debug!(
        nutrition_tokens = nutrition.context.tokens_used,
        allergen_tokens = allergens.context.tokens_used,
        flavor_tokens = flavor.context.tokens_used,
        allergen_count = allergens.value.allergens.len(),
        "enrichment joined"
    );

    Ok(EnrichmentBundle {
        nutrition: nutrition.value,
        allergens: allergens.value,
        flavor: flavor.value,
    })
}
