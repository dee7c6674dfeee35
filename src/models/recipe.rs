use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enrichment::NutritionEstimate;

/// Submitted input: raw recipe text plus a free-text goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub id: Uuid,
    pub text: String,
    pub goal: String,
    pub submitted_at: DateTime<Utc>,
}

impl RawDocument {
    pub fn new(text: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            goal: goal.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// A value the model may emit either as a JSON number or as text
/// (`2`, `"1 1/2"`, `"12 muffins"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    Number(serde_json::Number),
    Text(String),
}

impl LooseValue {
    /// Uniform textual rendering. Integers stay integral (`2`, not `2.0`).
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Integer reading: whole numbers pass through, fractional numbers are
    /// truncated, text yields its leading run of ASCII digits.
    pub fn leading_integer(&self) -> Option<u32> {
        match self {
            Self::Number(n) => {
                if let Some(v) = n.as_u64() {
                    u32::try_from(v).ok()
                } else {
                    n.as_f64()
                        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= f64::from(u32::MAX))
                        .map(|v| v.trunc() as u32)
                }
            }
            Self::Text(s) => {
                let digits: String = s
                    .trim_start()
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                if digits.is_empty() {
                    None
                } else {
                    digits.parse().ok()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<LooseValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured recipe as produced by the parse stage and, with
/// `improvements`/`diet_label` filled in, by synthesize and revise.
///
/// Stages never mutate a recipe they received; they build a new one with
/// the `with_*` helpers so each audit record reflects exactly what a stage saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    #[serde(default)]
    pub cooking_time: Option<LooseValue>,
    #[serde(default)]
    pub servings: Option<LooseValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionEstimate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diet_label: Option<String>,
}

/// Output of the parse stage.
pub type ParsedArtifact = Recipe;
/// Output of synthesize and of every refinement revision.
pub type CandidateArtifact = Recipe;

/// Top-level fields a recipe payload is allowed to carry.
pub const RECIPE_FIELDS: &[&str] = &[
    "title",
    "ingredients",
    "steps",
    "cooking_time",
    "servings",
    "nutrition",
    "improvements",
    "diet_label",
];

impl Recipe {
    pub fn with_nutrition(&self, nutrition: NutritionEstimate) -> Self {
        Self {
            nutrition: Some(nutrition),
            ..self.clone()
        }
    }

    pub fn with_diet_label(&self, label: &str) -> Self {
        Self {
            diet_label: Some(label.to_string()),
            ..self.clone()
        }
    }

    /// Fill `nutrition` from `fallback` when this recipe has none.
    pub fn inheriting_nutrition(self, fallback: Option<&NutritionEstimate>) -> Self {
        if self.nutrition.is_some() {
            return self;
        }
        Self {
            nutrition: fallback.cloned(),
            ..self
        }
    }
}
