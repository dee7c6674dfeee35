//! Prompt template registry.
//!
//! One fixed template per pipeline stage. Templates use `{name}` placeholders
//! which are filled by [`render`]; literal braces in the JSON examples are
//! left alone because only declared variable names are substituted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::contract::{OutputContract, RecoveryPolicy};
use super::PipelineError;
use crate::models::RECIPE_FIELDS;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Every class of generative call the pipeline makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Parse,
    Classify,
    Nutrition,
    Allergen,
    Flavor,
    Synthesize,
    Evaluate,
    Revise,
}

impl StageKind {
    pub const ALL: [StageKind; 8] = [
        Self::Parse,
        Self::Classify,
        Self::Nutrition,
        Self::Allergen,
        Self::Flavor,
        Self::Synthesize,
        Self::Evaluate,
        Self::Revise,
    ];

    /// Template id sent to the capability and used as audit stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Classify => "classify",
            Self::Nutrition => "nutrition",
            Self::Allergen => "allergen",
            Self::Flavor => "flavor",
            Self::Synthesize => "synthesize",
            Self::Evaluate => "evaluate",
            Self::Revise => "revise",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            Self::Parse => PARSE_TEMPLATE,
            Self::Classify => CLASSIFY_TEMPLATE,
            Self::Nutrition => NUTRITION_TEMPLATE,
            Self::Allergen => ALLERGEN_TEMPLATE,
            Self::Flavor => FLAVOR_TEMPLATE,
            Self::Synthesize => SYNTHESIZE_TEMPLATE,
            Self::Evaluate => EVALUATE_TEMPLATE,
            Self::Revise => REVISE_TEMPLATE,
        }
    }

    /// Placeholders the template expects.
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            Self::Parse => &["recipe_text"],
            Self::Classify => &["recipe_json", "goal", "diet_labels"],
            Self::Nutrition | Self::Allergen | Self::Flavor => &["recipe_json"],
            Self::Synthesize => &[
                "recipe_json",
                "goal",
                "diet_label",
                "nutrition_info",
                "allergen_info",
                "flavor_profile",
            ],
            Self::Evaluate => &["original_recipe", "optimized_recipe", "goal"],
            Self::Revise => &[
                "original_recipe",
                "current_recipe",
                "goal",
                "improvement_suggestions",
                "evaluator_feedback",
            ],
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            Self::Parse | Self::Classify => 0.2,
            Self::Nutrition | Self::Allergen | Self::Flavor => 0.1,
            Self::Synthesize => 0.5,
            Self::Evaluate | Self::Revise => 0.3,
        }
    }

    /// Required-field schema and, for stages that repair, the allow-list
    /// applied when a response had to be repaired.
    pub fn contract(&self) -> OutputContract {
        match self {
            Self::Parse | Self::Synthesize | Self::Revise => {
                OutputContract::new(&["title", "ingredients", "steps"]).allowing(RECIPE_FIELDS)
            }
            Self::Classify => OutputContract::new(&["diet_label"]).allowing(&["diet_label"]),
            Self::Nutrition => OutputContract::new(&[]),
            Self::Allergen => OutputContract::new(&["allergens"]),
            Self::Flavor => OutputContract::new(&["primary_flavors", "flavor_balance"]),
            Self::Evaluate => OutputContract::new(&["score"]).allowing(&[
                "score",
                "rationale",
                "improvement_suggestions",
            ]),
        }
    }

    /// Enrichers retry but never repair; every other stage repairs first.
    pub fn recovery(&self) -> RecoveryPolicy {
        match self {
            Self::Nutrition | Self::Allergen | Self::Flavor => RecoveryPolicy::RetryOnly,
            _ => RecoveryPolicy::RepairThenRetry,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels the classifier may choose from.
pub const DIET_LABELS: &[&str] = &[
    "gluten-free",
    "dairy-free",
    "vegan",
    "vegetarian",
    "keto",
    "low-carb",
    "low-sugar",
    "low-fat",
    "high-protein",
    "paleo",
    "balanced",
];

pub const FALLBACK_DIET_LABEL: &str = "balanced";

/// Lower-case and trim a classifier label; anything outside
/// [`DIET_LABELS`] becomes [`FALLBACK_DIET_LABEL`].
pub fn normalize_diet_label(raw: &str) -> String {
    let label = raw.trim().to_lowercase().replace(['_', ' '], "-");
    if DIET_LABELS.contains(&label.as_str()) {
        label
    } else {
        FALLBACK_DIET_LABEL.to_string()
    }
}

// ═══════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Fill a stage template. Every declared variable must be supplied.
///
/// Substitution is a single pass, so a value that itself contains
/// `{goal}` is inserted verbatim and never expanded.
pub fn render(stage: StageKind, variables: &BTreeMap<&str, String>) -> Result<String, PipelineError> {
    let declared = stage.variables();
    if let Some(missing) = declared.iter().find(|name| !variables.contains_key(*name)) {
        return Err(PipelineError::MissingVariable {
            stage: stage.to_string(),
            variable: (*missing).to_string(),
        });
    }

    let prompt = PLACEHOLDER.replace_all(stage.template(), |caps: &Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) if declared.contains(&name) => value.clone(),
            _ => caps[0].to_string(),
        }
    });
    Ok(prompt.into_owned())
}

// ═══════════════════════════════════════════════════════════
// Templates
// ═══════════════════════════════════════════════════════════

const PARSE_TEMPLATE: &str = r#"You are a recipe parsing expert that converts raw text recipes into structured JSON.

Parse the following recipe text into a structured JSON format. Extract the title, the ingredients list (with name, quantity, unit and notes as separate fields), and the steps as an ordered list. If present, also extract cooking time (minutes) and servings.

Recipe:
{recipe_text}

The output must conform to this JSON structure:
{
  "title": "Recipe Title",
  "ingredients": [
    { "name": "Ingredient", "quantity": "1", "unit": "cup", "notes": "optional notes" }
  ],
  "steps": ["Step 1 description", "Step 2 description"],
  "cooking_time": 30,
  "servings": 4
}

Parse the recipe text strictly, keeping all the original information intact. Be precise with ingredient quantities and units. Respond with JSON only."#;

const CLASSIFY_TEMPLATE: &str = r#"You are a diet classification expert that analyzes recipes and goals to determine the appropriate dietary category.

Analyze the following recipe and the user's goal to determine which diet category this recipe falls into after optimization.

Recipe JSON:
{recipe_json}

User's goal:
{goal}

Choose exactly ONE label from: {diet_labels}.

Respond with JSON containing only the diet_label field.
Example output: { "diet_label": "gluten-free" }"#;

const NUTRITION_TEMPLATE: &str = r#"You are a culinary nutritionist that analyzes recipes to extract precise nutritional information.

Analyze this recipe and estimate the nutritional content per serving.

Recipe:
{recipe_json}

Return a JSON object with these per-serving values:
- calories (kcal)
- protein_g (grams of protein)
- fat_g (grams of total fat)
- carbs_g (grams of total carbohydrates)
- sugar_g (grams of sugar)
- fiber_g (grams of fiber)
- sodium_mg (milligrams of sodium)

Output valid JSON with only these fields. Be realistic with your estimates.
Example output:
{
  "calories": 320,
  "protein_g": 12.5,
  "fat_g": 18.2,
  "carbs_g": 28.4,
  "sugar_g": 6.7,
  "fiber_g": 3.2,
  "sodium_mg": 420
}"#;

const ALLERGEN_TEMPLATE: &str = r#"You are an expert in food allergies and dietary restrictions.

Analyze this recipe and identify any common allergens or dietary restrictions it contains.

Recipe:
{recipe_json}

Identify which of these are present: Gluten, Dairy, Eggs, Nuts (specify which ones), Soy, Fish, Shellfish, Wheat.

Return a JSON object listing only the allergens that are present.
Example output:
{
  "allergens": ["Dairy", "Eggs", "Nuts (Almonds)"]
}"#;

const FLAVOR_TEMPLATE: &str = r#"You are a culinary expert specializing in flavor profiles and taste analysis.

Analyze this recipe and describe its flavor profile.

Recipe:
{recipe_json}

Identify the primary flavor notes (sweet, salty, umami, sour, bitter, spicy) and the key flavor characteristics that define this dish. Consider ingredients and cooking methods.

Return a JSON object with:
- primary_flavors: array of the dominant flavor notes
- flavor_balance: text description of how the flavors interact
- key_flavor_ingredients: array of ingredients contributing most to flavor

Example output:
{
  "primary_flavors": ["sweet", "spicy"],
  "flavor_balance": "Predominantly sweet with moderate heat",
  "key_flavor_ingredients": ["honey", "cayenne pepper", "ginger"]
}"#;

const SYNTHESIZE_TEMPLATE: &str = r#"You are a recipe optimization expert that modifies recipes to meet specific dietary goals while preserving flavor and culinary intent.

Transform this recipe to meet the following goal.

Original recipe:
{recipe_json}

Goal:
{goal}

Diet category:
{diet_label}

Nutrition information:
{nutrition_info}

Allergen information:
{allergen_info}

Flavor profile:
{flavor_profile}

Transform the recipe while:
1. Maintaining the original flavor profile as much as possible
2. Using practical, accessible ingredient substitutions
3. Keeping the same basic structure and cooking methods
4. Improving the nutritional profile to align with the goal

Return the complete modified recipe in the same JSON format as the original:
1. Include every field of the original (title, ingredients, steps, cooking_time, servings)
2. Add an "improvements" array describing the key modifications
3. Add a "nutrition" object with the new per-serving estimate using the same fields as above
4. Keep ingredient substitutions functional (binding, leavening)
5. Rename the title if the recipe changed substantially

Respond with JSON only."#;

const EVALUATE_TEMPLATE: &str = r#"You are a recipe optimization evaluator that critically assesses how well a recipe meets a specific goal.

Evaluate how well the optimized recipe meets the user's goal. Score it from 1-10 and suggest improvements.

Original recipe:
{original_recipe}

Optimized recipe:
{optimized_recipe}

User's goal:
{goal}

Evaluate based on:
1. How well the optimized recipe meets the goal (primary criterion)
2. Preservation of the original flavor profile and culinary intent
3. Feasibility of the ingredient substitutions
4. Overall improvement in nutrition (if applicable)

Return a JSON object with:
- score: integer from 1-10 (10 being perfect)
- rationale: brief explanation of the score
- improvement_suggestions: specific suggestions for further improvement (if score < 8)

Example output:
{
  "score": 7,
  "rationale": "Replaces dairy successfully but some flavor is lost",
  "improvement_suggestions": ["Add nutritional yeast for umami", "Increase spices to compensate"]
}"#;

const REVISE_TEMPLATE: &str = r#"You are a culinary expert specializing in recipe optimization and modification.

Revise this recipe to better meet the user's goal, incorporating the improvement suggestions.

Original recipe:
{original_recipe}

Current recipe version:
{current_recipe}

Goal:
{goal}

Improvement suggestions:
{improvement_suggestions}

Evaluation feedback:
{evaluator_feedback}

Return the improved recipe in the same JSON format as the original:
1. Maintain the overall structure of the original recipe
2. Focus modifications on ingredients and steps that relate to the goal
3. Add an "improvements" array listing the specific changes and why
4. Include an updated "nutrition" object
5. Keep the title unless it no longer matches the recipe

Respond with the complete recipe as JSON only."#;

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(stage: StageKind) -> BTreeMap<&'static str, String> {
        stage
            .variables()
            .iter()
            .map(|name| (*name, format!("<{name}>")))
            .collect()
    }

    #[test]
    fn every_template_mentions_its_variables() {
        for stage in StageKind::ALL {
            for name in stage.variables() {
                assert!(
                    stage.template().contains(&format!("{{{name}}}")),
                    "{stage} template lacks {{{name}}}"
                );
            }
        }
    }

    #[test]
    fn render_fills_all_placeholders() {
        for stage in StageKind::ALL {
            let prompt = render(stage, &vars(stage)).unwrap();
            for name in stage.variables() {
                assert!(prompt.contains(&format!("<{name}>")));
                assert!(!prompt.contains(&format!("{{{name}}}")));
            }
        }
    }

    #[test]
    fn render_keeps_literal_json_braces() {
        let prompt = render(StageKind::Nutrition, &vars(StageKind::Nutrition)).unwrap();
        assert!(prompt.contains("\"calories\": 320"));
        assert!(prompt.contains('{'));
    }

    #[test]
    fn render_does_not_expand_placeholders_inside_values() {
        let mut variables = vars(StageKind::Classify);
        variables.insert("recipe_json", "{goal}".into());
        variables.insert("goal", "lower sugar".into());
        let prompt = render(StageKind::Classify, &variables).unwrap();
        assert!(prompt.contains("Recipe JSON:\n{goal}"));
        assert!(prompt.contains("User's goal:\nlower sugar"));
    }

    #[test]
    fn render_reports_missing_variable() {
        let err = render(StageKind::Evaluate, &BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingVariable { ref variable, .. } if variable == "original_recipe"
        ));
    }

    #[test]
    fn stage_names_are_unique() {
        let mut names: Vec<&str> = StageKind::ALL.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), StageKind::ALL.len());
    }

    #[test]
    fn enrichers_do_not_repair() {
        assert_eq!(StageKind::Nutrition.recovery(), RecoveryPolicy::RetryOnly);
        assert_eq!(StageKind::Allergen.recovery(), RecoveryPolicy::RetryOnly);
        assert_eq!(StageKind::Flavor.recovery(), RecoveryPolicy::RetryOnly);
        assert_eq!(StageKind::Parse.recovery(), RecoveryPolicy::RepairThenRetry);
        assert_eq!(StageKind::Revise.recovery(), RecoveryPolicy::RepairThenRetry);
    }

    #[test]
    fn allow_lists_only_on_repairing_stages() {
        for stage in StageKind::ALL {
            if stage.recovery() == RecoveryPolicy::RetryOnly {
                assert!(stage.contract().allowed().is_none(), "{stage} has an unused allow-list");
            }
        }
        assert!(StageKind::Parse.contract().allowed().is_some());
    }

    #[test]
    fn diet_label_normalization() {
        assert_eq!(normalize_diet_label(" Low-Sugar "), "low-sugar");
        assert_eq!(normalize_diet_label("high protein"), "high-protein");
        assert_eq!(normalize_diet_label("low_carb"), "low-carb");
        assert_eq!(normalize_diet_label("carnivore"), "balanced");
        assert_eq!(normalize_diet_label(""), "balanced");
    }
}
