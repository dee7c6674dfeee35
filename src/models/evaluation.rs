use serde::{Deserialize, Deserializer, Serialize};

use super::recipe::LooseValue;

/// Evaluator verdict on one candidate. Never persisted on its own; it is
/// consumed by the next refinement step and only survives in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 1-10; fractional or out-of-range scores are rounded and clamped.
    #[serde(deserialize_with = "clamped_score")]
    pub score: u8,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

fn clamped_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = LooseValue::deserialize(deserializer)?;
    let value = match &raw {
        LooseValue::Number(n) => n.as_f64(),
        LooseValue::Text(s) => s.trim().split('/').next().and_then(|v| v.trim().parse().ok()),
    };
    match value {
        Some(v) if v.is_finite() => Ok(v.round().clamp(1.0, 10.0) as u8),
        _ => Err(serde::de::Error::custom(format!(
            "score is not numeric: {}",
            raw.to_text()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(score: serde_json::Value) -> Result<Evaluation, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "score": score,
            "rationale": "ok",
            "improvement_suggestions": ["less sugar"]
        }))
    }

    #[test]
    fn integer_score() {
        assert_eq!(parse(serde_json::json!(7)).unwrap().score, 7);
    }

    #[test]
    fn fractional_and_text_scores() {
        assert_eq!(parse(serde_json::json!(7.6)).unwrap().score, 8);
        assert_eq!(parse(serde_json::json!("9")).unwrap().score, 9);
        assert_eq!(parse(serde_json::json!("6/10")).unwrap().score, 6);
    }

    #[test]
    fn out_of_range_scores_are_clamped() {
        assert_eq!(parse(serde_json::json!(0)).unwrap().score, 1);
        assert_eq!(parse(serde_json::json!(42)).unwrap().score, 10);
    }

    #[test]
    fn non_numeric_score_is_an_error() {
        assert!(parse(serde_json::json!("great")).is_err());
    }

    #[test]
    fn suggestions_default_to_empty() {
        let eval: Evaluation = serde_json::from_value(serde_json::json!({"score": 9})).unwrap();
        assert!(eval.improvement_suggestions.is_empty());
        assert!(eval.rationale.is_empty());
    }
}
