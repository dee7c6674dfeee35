use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StorageError;

/// How a single generative call ended, from the invoker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Output satisfied the contract as returned.
    Accepted,
    /// Output satisfied the contract after repair.
    Repaired,
    /// Output was rejected by the contract.
    Rejected,
    /// The capability itself failed; no text came back.
    TransportError,
}

/// One generative call. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub document_id: Uuid,
    pub stage_name: String,
    /// 1 for the first call of an invocation, 2 for its retry.
    pub attempt: u8,
    pub prompt_text: String,
    /// Parsed payload when the contract accepted it, raw text (or the
    /// transport error message) otherwise.
    pub response_payload: serde_json::Value,
    pub latency_ms: u64,
    pub tokens_used: u32,
    /// False when `tokens_used` is a length-based estimate.
    pub tokens_reported: bool,
    pub outcome: CallOutcome,
    pub timestamp: DateTime<Utc>,
}

/// Durable log of generative calls.
///
/// `record` is fire-and-forget: it must return promptly and never fail the
/// pipeline. Implementations must accept concurrent appends from
/// independent pipeline runs.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Which side of the optimization an index entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedKind {
    Original,
    Optimized,
}

/// Labels attached to both indexed payloads of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexLabels {
    pub document_id: Uuid,
    pub diet_label: String,
    pub title: String,
    pub optimized_title: String,
}

/// Similarity store used for later retrieval of optimized recipes.
#[async_trait]
pub trait VectorIndexer: Send + Sync {
    async fn index(
        &self,
        original_payload: &serde_json::Value,
        optimized_payload: &serde_json::Value,
        goal: &str,
        labels: &IndexLabels,
    ) -> Result<(), StorageError>;
}
