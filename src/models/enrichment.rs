use serde::{Deserialize, Deserializer, Serialize};

use super::recipe::LooseValue;

/// Per-serving macro estimate from the nutrition enricher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionEstimate {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub calories: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub protein_g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fat_g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbs_g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sugar_g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fiber_g: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sodium_mg: Option<f64>,
}

/// Accepts `12.5`, `"12.5"`, `"12.5 g"` or null. Text without a numeric
/// prefix reads as missing rather than failing the whole estimate.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<LooseValue> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        LooseValue::Number(n) => n.as_f64(),
        LooseValue::Text(s) => {
            let prefix: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            prefix.parse().ok()
        }
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllergenSet {
    #[serde(default)]
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlavorProfile {
    #[serde(default)]
    pub primary_flavors: Vec<String>,
    #[serde(default)]
    pub flavor_balance: String,
    #[serde(default)]
    pub key_flavor_ingredients: Vec<String>,
}

/// The three annotations produced by the enrichment fan-out, keyed by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentBundle {
    pub nutrition: NutritionEstimate,
    pub allergens: AllergenSet,
    pub flavor: FlavorProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nutrition_accepts_numbers_and_numeric_text() {
        let estimate: NutritionEstimate = serde_json::from_value(serde_json::json!({
            "calories": 320,
            "protein_g": "12.5",
            "fat_g": "18.2 g",
            "sugar_g": null,
            "sodium_mg": "unknown"
        }))
        .unwrap();
        assert_eq!(estimate.calories, Some(320.0));
        assert_eq!(estimate.protein_g, Some(12.5));
        assert_eq!(estimate.fat_g, Some(18.2));
        assert_eq!(estimate.carbs_g, None);
        assert_eq!(estimate.sugar_g, None);
        assert_eq!(estimate.sodium_mg, None);
    }

    #[test]
    fn flavor_profile_defaults_missing_fields() {
        let flavor: FlavorProfile =
            serde_json::from_value(serde_json::json!({"primary_flavors": ["sweet"]})).unwrap();
        assert_eq!(flavor.primary_flavors, vec!["sweet"]);
        assert!(flavor.flavor_balance.is_empty());
        assert!(flavor.key_flavor_ingredients.is_empty());
    }
}
