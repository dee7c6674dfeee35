use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LlmError;

/// One call to the generative capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    /// Stable identifier of the prompt template that produced `prompt`.
    pub template_id: String,
    /// Fully rendered prompt text.
    pub prompt: String,
    pub temperature: f32,
    /// Ask the backend to constrain output to JSON where it supports it.
    pub json_mode: bool,
}

/// Usage metadata reported by the backend for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Raw model output plus whatever usage the backend exposed for this call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Generation {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Generative capability abstraction (allows mocking).
///
/// Implementations must be callable concurrently; usage metadata travels
/// back in the returned [`Generation`] rather than through shared state.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError>;

    /// Model variant this client targets, for logs and audit.
    fn model_name(&self) -> &str;
}
