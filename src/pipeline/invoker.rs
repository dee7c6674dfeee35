//! Stage invoker: render a template, call the generative capability, and
//! hold the response to the stage's output contract.
//!
//! Failure policy, per invocation:
//! 1. strict parse of the first response;
//! 2. if the stage allows it, repair of that same response;
//! 3. exactly one bare retry of the call, parsed strictly;
//! 4. otherwise fail with `MalformedOutput` (last response was text that
//!    broke the contract) or `GenerationFailed` (last call never returned).
//!
//! Usage metadata is collected into an [`InvocationContext`] owned by the
//! call, so concurrent invocations never observe each other's counts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::contract::{ContractViolation, RecoveryPolicy};
use super::llm::{GenerationRequest, GenerativeClient, LlmError};
use super::prompt_templates::{render, StageKind};
use super::storage::{AuditRecord, AuditSink, CallOutcome};
use super::PipelineError;

/// Characters per token used when the backend reports no usage.
/// An approximation for cost logging only.
pub const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

/// Per-invocation accounting, summed over every attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub attempts: u8,
    pub repaired: bool,
    pub tokens_used: u32,
    /// True if any attempt had to fall back to the length estimate.
    pub tokens_estimated: bool,
    pub latency_ms: u64,
}

/// A contract-satisfying stage result.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<T> {
    pub value: T,
    pub context: InvocationContext,
}

enum AttemptFailure {
    Transport(LlmError),
    Malformed(ContractViolation),
}

/// Runs stages for one document. Cheap to build per run; the client and
/// audit sink are shared.
#[derive(Clone)]
pub struct StageInvoker {
    client: Arc<dyn GenerativeClient>,
    audit: Arc<dyn AuditSink>,
    document_id: Uuid,
}

impl StageInvoker {
    pub fn new(client: Arc<dyn GenerativeClient>, audit: Arc<dyn AuditSink>, document_id: Uuid) -> Self {
        Self {
            client,
            audit,
            document_id,
        }
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub async fn invoke<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        variables: &BTreeMap<&str, String>,
    ) -> Result<Invocation<T>, PipelineError> {
        let prompt = render(stage, variables)?;
        let request = GenerationRequest {
            template_id: stage.as_str().to_string(),
            prompt,
            temperature: stage.temperature(),
            json_mode: true,
        };
        let span = tracing::debug_span!("stage", doc_id = %self.document_id, stage = %stage);
        self.invoke_request(stage, &request).instrument(span).await
    }

    async fn invoke_request<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        request: &GenerationRequest,
    ) -> Result<Invocation<T>, PipelineError> {
        let mut context = InvocationContext::default();
        let allow_repair = stage.recovery() == RecoveryPolicy::RepairThenRetry;

        match self.attempt(stage, request, allow_repair, &mut context).await {
            Ok(value) => return Ok(Invocation { value, context }),
            Err(AttemptFailure::Transport(e)) => {
                tracing::warn!(stage = %stage, error = %e, "generation failed, retrying once");
            }
            Err(AttemptFailure::Malformed(v)) => {
                tracing::warn!(stage = %stage, error = %v, "output broke contract, retrying once");
            }
        }

        match self.attempt(stage, request, false, &mut context).await {
            Ok(value) => Ok(Invocation { value, context }),
            Err(AttemptFailure::Transport(source)) => Err(PipelineError::GenerationFailed {
                stage: stage.to_string(),
                attempts: context.attempts,
                source,
            }),
            Err(AttemptFailure::Malformed(source)) => Err(PipelineError::MalformedOutput {
                stage: stage.to_string(),
                attempts: context.attempts,
                source,
            }),
        }
    }

    /// One call to the capability plus contract checking. Emits exactly
    /// one audit record whatever the outcome.
    async fn attempt<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        request: &GenerationRequest,
        allow_repair: bool,
        context: &mut InvocationContext,
    ) -> Result<T, AttemptFailure> {
        context.attempts += 1;
        let attempt = context.attempts;
        let started = Instant::now();
        let result = self.client.generate(request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        context.latency_ms = context.latency_ms.saturating_add(latency_ms);

        let generation = match result {
            Ok(generation) => generation,
            Err(e) => {
                let tokens = estimate_tokens(&request.prompt);
                context.tokens_used = context.tokens_used.saturating_add(tokens);
                context.tokens_estimated = true;
                self.emit(stage, attempt, request, Value::String(e.to_string()), latency_ms, tokens, false, CallOutcome::TransportError);
                return Err(AttemptFailure::Transport(e));
            }
        };

        let (tokens, reported) = match generation.usage {
            Some(usage) => (usage.total(), true),
            None => (estimate_tokens(&request.prompt), false),
        };
        context.tokens_used = context.tokens_used.saturating_add(tokens);
        context.tokens_estimated |= !reported;

        let contract = stage.contract();
        let strict = contract.parse_strict::<T>(&generation.text);
        let (parsed, outcome) = match strict {
            Ok(parsed) => (Ok(parsed), CallOutcome::Accepted),
            Err(violation) if allow_repair => match contract.parse_repaired::<T>(&generation.text) {
                Ok(parsed) => {
                    tracing::debug!(stage = %stage, first_error = %violation, "output repaired");
                    context.repaired = true;
                    (Ok(parsed), CallOutcome::Repaired)
                }
                Err(after_repair) => (Err(after_repair), CallOutcome::Rejected),
            },
            Err(violation) => (Err(violation), CallOutcome::Rejected),
        };

        tracing::debug!(stage = %stage, attempt, latency_ms, tokens_used = tokens, tokens_reported = reported, outcome = ?outcome, "stage call finished");

        match parsed {
            Ok((value, payload)) => {
                self.emit(stage, attempt, request, payload, latency_ms, tokens, reported, outcome);
                Ok(value)
            }
            Err(violation) => {
                self.emit(stage, attempt, request, Value::String(generation.text), latency_ms, tokens, reported, outcome);
                Err(AttemptFailure::Malformed(violation))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        stage: StageKind,
        attempt: u8,
        request: &GenerationRequest,
        response_payload: Value,
        latency_ms: u64,
        tokens_used: u32,
        tokens_reported: bool,
        outcome: CallOutcome,
    ) {
        self.audit.record(AuditRecord {
            document_id: self.document_id,
            stage_name: stage.as_str().to_string(),
            attempt,
            prompt_text: request.prompt.clone(),
            response_payload,
            latency_ms,
            tokens_used,
            tokens_reported,
            outcome,
            timestamp: Utc::now(),
        });
    }
}

/// Length-based token estimate: prompt characters / 4, rounded up.
pub fn estimate_tokens(prompt: &str) -> u32 {
    let tokens = prompt.chars().count().div_ceil(CHARS_PER_TOKEN_ESTIMATE);
    u32::try_from(tokens).unwrap_or(u32::MAX)
}
