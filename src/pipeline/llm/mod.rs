pub mod types;
pub mod ollama;
pub mod mock;

pub use types::*;
pub use ollama::*;
pub use mock::*;

use thiserror::Error;

/// Failures of the generative capability itself (transport level).
///
/// Anything that arrives as text is returned as text; deciding whether the
/// text is well-formed is the output contract's job, not the client's.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Ollama is not running at {0}")]
    Connection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Could not decode model envelope: {0}")]
    Envelope(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}
