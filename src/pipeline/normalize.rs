//! Output shaping: uniform textual quantities, integer servings, cooking
//! time in minutes, and the final schema check.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Ingredient, LooseValue, NormalizedIngredient, Recipe, RecipeContent};

use super::PipelineError;

pub fn normalize_ingredient(ingredient: &Ingredient) -> NormalizedIngredient {
    NormalizedIngredient {
        name: ingredient.name.trim().to_string(),
        quantity: ingredient
            .quantity
            .as_ref()
            .map(|q| q.to_text().trim().to_string())
            .filter(|q| !q.is_empty()),
        unit: ingredient.unit.clone(),
        notes: ingredient.notes.clone(),
    }
}

/// Amount (`2`, `1.5`, `1 1/2`, `1/2`) followed by an optional unit word.
static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?(?:\s+\d+/\d+)?|\d+/\d+)\s*([a-z]+)?").unwrap()
});

fn parse_amount(text: &str) -> Option<f64> {
    let mut total = 0.0;
    for part in text.split_whitespace() {
        total += match part.split_once('/') {
            Some((num, den)) => {
                let den: f64 = den.parse().ok()?;
                if den == 0.0 {
                    return None;
                }
                num.parse::<f64>().ok()? / den
            }
            None => part.parse::<f64>().ok()?,
        };
    }
    Some(total)
}

fn minutes_per_unit(unit: Option<&str>) -> Option<f64> {
    match unit.map(str::to_ascii_lowercase).as_deref() {
        None | Some("m" | "min" | "mins" | "minute" | "minutes") => Some(1.0),
        Some("h" | "hr" | "hrs" | "hour" | "hours") => Some(60.0),
        Some(_) => None,
    }
}

/// Cooking time in whole minutes.
///
/// Numbers are taken as minutes. Text is summed over its amount/unit pairs
/// (`"1 1/2 hours"` → 90, `"1 hour 15 minutes"` → 75). Any other unit, or
/// text without a number, drops the value.
pub fn cooking_minutes(value: &LooseValue) -> Option<u32> {
    let text = match value {
        LooseValue::Number(_) => return value.leading_integer(),
        LooseValue::Text(text) => text,
    };

    let mut total = 0.0;
    let mut parts = 0;
    for part in DURATION_PART.captures_iter(text) {
        let amount = parse_amount(&part[1])?;
        let scale = minutes_per_unit(part.get(2).map(|m| m.as_str()))?;
        total += amount * scale;
        parts += 1;
    }

    if parts == 0 || !total.is_finite() || total > f64::from(u32::MAX) {
        return None;
    }
    Some(total.round() as u32)
}

/// Coerce a recipe into its output shape.
///
/// `servings` keeps only its leading integer (`"12 muffins"` → 12) and
/// `cooking_time` becomes minutes; a value that cannot be read that way
/// (`"a dozen"`, `"overnight"`) is dropped rather than guessed.
pub fn normalize_recipe(recipe: &Recipe) -> RecipeContent {
    RecipeContent {
        title: recipe.title.trim().to_string(),
        ingredients: recipe.ingredients.iter().map(normalize_ingredient).collect(),
        steps: recipe.steps.clone(),
        nutrition: recipe.nutrition.clone(),
        cooking_time: recipe.cooking_time.as_ref().and_then(cooking_minutes),
        servings: recipe.servings.as_ref().and_then(|v| v.leading_integer()),
    }
}

/// A result recipe needs a title, named ingredients and at least one step.
pub fn validate(content: &RecipeContent, side: &str) -> Result<(), PipelineError> {
    if content.title.is_empty() {
        return Err(PipelineError::ValidationFailed(format!("{side} recipe has no title")));
    }
    if content.ingredients.is_empty() {
        return Err(PipelineError::ValidationFailed(format!("{side} recipe has no ingredients")));
    }
    if let Some(index) = content.ingredients.iter().position(|i| i.name.is_empty()) {
        return Err(PipelineError::ValidationFailed(format!(
            "{side} recipe ingredient {index} has no name"
        )));
    }
    if content.steps.iter().all(|s| s.trim().is_empty()) {
        return Err(PipelineError::ValidationFailed(format!("{side} recipe has no steps")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn recipe(value: serde_json::Value) -> Recipe {
        serde_json::from_value(value).unwrap()
    }

    fn muffins(servings: serde_json::Value) -> Recipe {
        recipe(json!({
            "title": "Blueberry Muffins",
            "ingredients": [
                {"name": "flour", "quantity": 2, "unit": "cups"},
                {"name": "sugar", "quantity": 0.75, "unit": "cup"},
                {"name": "blueberries", "quantity": "1 1/2", "unit": "cups"},
                {"name": "salt", "quantity": null, "unit": "pinch"}
            ],
            "steps": ["Mix.", "Bake."],
            "servings": servings,
            "cooking_time": "25 minutes"
        }))
    }

    #[test]
    fn quantities_become_uniform_text() {
        let content = normalize_recipe(&muffins(json!(12)));
        let quantities: Vec<Option<&str>> =
            content.ingredients.iter().map(|i| i.quantity.as_deref()).collect();
        assert_eq!(quantities, vec![Some("2"), Some("0.75"), Some("1 1/2"), None]);
    }

    #[test]
    fn textual_servings_keep_leading_integer() {
        assert_eq!(normalize_recipe(&muffins(json!("12 muffins"))).servings, Some(12));
    }

    #[test]
    fn servings_without_numeric_prefix_are_dropped() {
        assert_eq!(normalize_recipe(&muffins(json!("a dozen"))).servings, None);
    }

    #[test]
    fn numeric_servings_pass_through() {
        assert_eq!(normalize_recipe(&muffins(json!(4))).servings, Some(4));
    }

    #[test]
    fn cooking_time_keeps_leading_integer() {
        assert_eq!(normalize_recipe(&muffins(json!(12))).cooking_time, Some(25));
    }

    #[test]
    fn cooking_time_in_minutes_is_kept() {
        assert_eq!(cooking_minutes(&LooseValue::Text("45 minutes".into())), Some(45));
        assert_eq!(cooking_minutes(&LooseValue::Text("20 min".into())), Some(20));
        assert_eq!(cooking_minutes(&LooseValue::Text("30".into())), Some(30));
        assert_eq!(cooking_minutes(&LooseValue::Number(40.into())), Some(40));
    }

    #[test]
    fn cooking_time_in_hours_converts_to_minutes() {
        assert_eq!(cooking_minutes(&LooseValue::Text("1 1/2 hours".into())), Some(90));
        assert_eq!(cooking_minutes(&LooseValue::Text("2 hours".into())), Some(120));
        assert_eq!(cooking_minutes(&LooseValue::Text("1.5 hr".into())), Some(90));
        assert_eq!(cooking_minutes(&LooseValue::Text("1 hour 15 minutes".into())), Some(75));
    }

    #[test]
    fn unreadable_cooking_time_is_dropped() {
        assert_eq!(cooking_minutes(&LooseValue::Text("overnight".into())), None);
        assert_eq!(cooking_minutes(&LooseValue::Text("3 days".into())), None);
    }

    #[test]
    fn hour_based_cooking_time_reaches_recipe_content() {
        let mut source = muffins(json!(12));
        source.cooking_time = Some(LooseValue::Text("1 1/2 hours".into()));
        assert_eq!(normalize_recipe(&source).cooking_time, Some(90));
    }

    #[test]
    fn dropped_servings_serialize_as_null() {
        let content = normalize_recipe(&muffins(json!("a dozen")));
        let value = serde_json::to_value(&content).unwrap();
        assert!(value["servings"].is_null());
    }

    #[test]
    fn valid_recipe_passes() {
        assert!(validate(&normalize_recipe(&muffins(json!(12))), "optimized").is_ok());
    }

    #[test]
    fn blank_title_fails_validation() {
        let mut content = normalize_recipe(&muffins(json!(12)));
        content.title = String::new();
        let err = validate(&content, "optimized").unwrap_err();
        assert_eq!(err, PipelineError::ValidationFailed("optimized recipe has no title".into()));
    }

    #[test]
    fn empty_ingredients_fail_validation() {
        let content = normalize_recipe(&recipe(json!({
            "title": "Water", "ingredients": [], "steps": ["Pour."]
        })));
        assert!(matches!(validate(&content, "original"), Err(PipelineError::ValidationFailed(_))));
    }

    #[test]
    fn unnamed_ingredient_fails_validation() {
        let content = normalize_recipe(&recipe(json!({
            "title": "Mystery", "ingredients": [{"name": "  "}], "steps": ["Stir."]
        })));
        assert!(matches!(validate(&content, "original"), Err(PipelineError::ValidationFailed(_))));
    }

    #[test]
    fn blank_steps_fail_validation() {
        let content = normalize_recipe(&recipe(json!({
            "title": "Toast", "ingredients": [{"name": "bread"}], "steps": ["", " "]
        })));
        assert!(matches!(validate(&content, "optimized"), Err(PipelineError::ValidationFailed(_))));
    }
}
