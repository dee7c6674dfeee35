pub mod llm;
pub mod repair;
pub mod contract;
pub mod prompt_templates;
pub mod invoker;
pub mod enrich;
pub mod refine;
pub mod normalize;
pub mod orchestrator;
pub mod storage;

use thiserror::Error;

use self::contract::ContractViolation;
use self::llm::LlmError;

/// Pipeline-level failures. Any of these ends the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Recipe text is empty")]
    EmptyInput,

    #[error("Template for stage {stage} needs variable {variable}")]
    MissingVariable { stage: String, variable: String },

    #[error("Stage {stage} produced malformed output after {attempts} attempts: {source}")]
    MalformedOutput {
        stage: String,
        attempts: u8,
        #[source]
        source: ContractViolation,
    },

    #[error("Stage {stage} generation failed after {attempts} attempts: {source}")]
    GenerationFailed {
        stage: String,
        attempts: u8,
        #[source]
        source: LlmError,
    },

    #[error("Final recipe failed validation: {0}")]
    ValidationFailed(String),

    #[error("Could not serialize stage input: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}
