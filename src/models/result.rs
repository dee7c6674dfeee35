use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enrichment::NutritionEstimate;

/// Field-by-field difference `optimized - original`, rounded to 0.01.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroDelta {
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    pub sugar_g: f64,
    pub fiber_g: f64,
    pub sodium_mg: f64,
}

impl MacroDelta {
    /// All-zero unless both sides carry an estimate. Missing individual
    /// fields count as zero.
    pub fn between(
        original: Option<&NutritionEstimate>,
        optimized: Option<&NutritionEstimate>,
    ) -> Self {
        let (Some(orig), Some(opt)) = (original, optimized) else {
            return Self::default();
        };
        let diff = |a: Option<f64>, b: Option<f64>| round2(b.unwrap_or(0.0) - a.unwrap_or(0.0));
        Self {
            calories: diff(orig.calories, opt.calories),
            protein_g: diff(orig.protein_g, opt.protein_g),
            fat_g: diff(orig.fat_g, opt.fat_g),
            carbs_g: diff(orig.carbs_g, opt.carbs_g),
            sugar_g: diff(orig.sugar_g, opt.sugar_g),
            fiber_g: diff(orig.fiber_g, opt.fiber_g),
            sodium_mg: diff(orig.sodium_mg, opt.sodium_mg),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Ingredient after normalization: quantity is always text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIngredient {
    pub name: String,
    pub quantity: Option<String>,
    pub unit: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeContent {
    pub title: String,
    pub ingredients: Vec<NormalizedIngredient>,
    pub steps: Vec<String>,
    pub nutrition: Option<NutritionEstimate>,
    pub cooking_time: Option<u32>,
    pub servings: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedRecipe {
    #[serde(flatten)]
    pub content: RecipeContent,
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Badges {
    pub allergens: Vec<String>,
    pub macros_delta: MacroDelta,
}

/// How the bounded refinement loop ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSummary {
    /// Revise cycles actually run.
    pub revisions: u32,
    /// Score of the last evaluation, if any evaluation ran.
    pub last_score: Option<u8>,
    /// Whether the last evaluation reached the pass score.
    pub passed: bool,
}

/// Everything `run` hands back to the service layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub document_id: Uuid,
    pub original: RecipeContent,
    pub optimized: OptimizedRecipe,
    pub diet_label: String,
    pub badges: Badges,
    pub refinement: RefinementSummary,
}
