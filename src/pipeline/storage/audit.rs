use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{AuditRecord, AuditSink};

/// In-memory audit trail for tests and inspection.
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn records_for_document(&self, document_id: &Uuid) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.document_id == *document_id)
            .cloned()
            .collect()
    }

    /// Stage names in append order.
    pub fn stages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.stage_name.clone())
            .collect()
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

/// Emits one structured log line per record. Prompt and response bodies
/// are reduced to their lengths.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "recipe_optimizer::audit",
            doc_id = %record.document_id,
            stage = %record.stage_name,
            attempt = record.attempt,
            outcome = ?record.outcome,
            latency_ms = record.latency_ms,
            tokens_used = record.tokens_used,
            tokens_reported = record.tokens_reported,
            prompt_chars = record.prompt_text.len(),
            "llm call"
        );
    }
}

/// Hands records to an unbounded channel; a separate task drains the
/// receiver into durable storage without ever blocking the pipeline.
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<AuditRecord>,
}

impl ChannelAuditSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, record: AuditRecord) {
        if self.sender.send(record).is_err() {
            tracing::warn!("audit receiver dropped, record discarded");
        }
    }
}
