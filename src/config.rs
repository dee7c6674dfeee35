//! Process-wide configuration, read once from the environment at startup.
//!
//! Values are immutable for the lifetime of the process: the binary builds a
//! `PipelineConfig` before creating the runtime and hands clones to whoever
//! needs them. Tests use [`PipelineConfig::from_lookup`] instead of touching
//! the process environment.

use serde::Serialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "recipe-optimizer";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default refinement loop bound.
pub const DEFAULT_MAX_ITER: u32 = 3;
/// Default evaluation score at which refinement stops.
pub const DEFAULT_PASS_SCORE: u8 = 8;
pub const DEFAULT_MODEL_NAME: &str = "llama3.1:8b";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const ENV_MAX_ITER: &str = "MAX_ITER";
pub const ENV_MODEL_NAME: &str = "MODEL_NAME";
pub const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
pub const ENV_TIMEOUT_SECS: &str = "LLM_TIMEOUT_SECS";
pub const ENV_PASS_SCORE: &str = "PASS_SCORE";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "recipe_optimizer=debug,info"
    } else {
        "recipe_optimizer=info,warn"
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{key} must be between {min} and {max}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Recognised configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Upper bound on evaluate-revise cycles.
    pub max_iter: u32,
    /// Which model variant the generative capability should call.
    pub model_name: String,
    /// Base URL of the Ollama instance.
    pub ollama_url: String,
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout_secs: u64,
    /// Evaluation score that ends refinement early.
    pub pass_score: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            pass_score: DEFAULT_PASS_SCORE,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get(ENV_MAX_ITER) {
            config.max_iter = parse_number(ENV_MAX_ITER, &raw)?;
        }
        if let Some(raw) = get(ENV_MODEL_NAME) {
            config.model_name = raw.trim().to_string();
        }
        if let Some(raw) = get(ENV_OLLAMA_URL) {
            config.ollama_url = raw.trim().trim_end_matches('/').to_string();
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = parse_number(ENV_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_PASS_SCORE) {
            let score: u8 = parse_number(ENV_PASS_SCORE, &raw)?;
            if !(1..=10).contains(&score) {
                return Err(ConfigError::OutOfRange {
                    key: ENV_PASS_SCORE,
                    value: i64::from(score),
                    min: 1,
                    max: 10,
                });
            }
            config.pass_score = score;
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.max_iter, 3);
        assert_eq!(config.pass_score, 8);
    }

    #[test]
    fn reads_recognised_keys() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("MAX_ITER", "5"),
            ("MODEL_NAME", "qwen2.5:7b"),
            ("OLLAMA_URL", "http://gpu-box:11434/"),
            ("LLM_TIMEOUT_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.max_iter, 5);
        assert_eq!(config.model_name, "qwen2.5:7b");
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn zero_max_iter_is_allowed() {
        let config = PipelineConfig::from_lookup(lookup(&[("MAX_ITER", "0")])).unwrap();
        assert_eq!(config.max_iter, 0);
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = PipelineConfig::from_lookup(lookup(&[("MODEL_NAME", "  ")])).unwrap();
        assert_eq!(config.model_name, DEFAULT_MODEL_NAME);
    }

    #[test]
    fn invalid_integer_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("MAX_ITER", "three")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "MAX_ITER",
                value: "three".into()
            }
        );
    }

    #[test]
    fn pass_score_out_of_range_is_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[("PASS_SCORE", "11")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "PASS_SCORE", .. }));
    }

    #[test]
    fn app_name_is_stable() {
        assert_eq!(APP_NAME, "recipe-optimizer");
    }
}
