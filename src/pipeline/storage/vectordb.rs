use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::types::{IndexLabels, IndexedKind, VectorIndexer};
use super::StorageError;

/// In-memory index for testing and single-process use.
/// Stores both payloads of a run with their labels.
pub struct InMemoryIndexer {
    entries: Mutex<Vec<IndexedRecipe>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedRecipe {
    pub document_id: Uuid,
    pub kind: IndexedKind,
    pub content: String,
    pub goal: String,
    pub diet_label: String,
    pub title: String,
    pub optimized_title: String,
}

impl InMemoryIndexer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn entries_for_document(&self, document_id: &Uuid) -> Vec<IndexedRecipe> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.document_id == *document_id)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndexer for InMemoryIndexer {
    async fn index(
        &self,
        original_payload: &serde_json::Value,
        optimized_payload: &serde_json::Value,
        goal: &str,
        labels: &IndexLabels,
    ) -> Result<(), StorageError> {
        let make = |kind: IndexedKind, payload: &serde_json::Value| -> Result<IndexedRecipe, StorageError> {
            Ok(IndexedRecipe {
                document_id: labels.document_id,
                kind,
                content: serde_json::to_string(payload)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
                goal: goal.to_string(),
                diet_label: labels.diet_label.clone(),
                title: labels.title.clone(),
                optimized_title: labels.optimized_title.clone(),
            })
        };

        let original = make(IndexedKind::Original, original_payload)?;
        let optimized = make(IndexedKind::Optimized, optimized_payload)?;

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("index lock poisoned".into()))?;
        entries.push(original);
        entries.push(optimized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn labels(document_id: Uuid) -> IndexLabels {
        IndexLabels {
            document_id,
            diet_label: "low-sugar".into(),
            title: "Blueberry Muffins".into(),
            optimized_title: "Reduced-Sugar Blueberry Muffins".into(),
        }
    }

    #[tokio::test]
    async fn index_stores_both_sides() {
        let indexer = InMemoryIndexer::new();
        let doc = Uuid::new_v4();
        indexer
            .index(&json!({"title": "a"}), &json!({"title": "b"}), "lower sugar", &labels(doc))
            .await
            .unwrap();

        let entries = indexer.entries_for_document(&doc);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, IndexedKind::Original);
        assert_eq!(entries[1].kind, IndexedKind::Optimized);
        assert_eq!(entries[1].goal, "lower sugar");
        assert_eq!(entries[1].diet_label, "low-sugar");
        assert!(entries[0].content.contains("\"a\""));
    }

    #[tokio::test]
    async fn separate_runs_do_not_mix() {
        let indexer = InMemoryIndexer::new();
        let doc1 = Uuid::new_v4();
        let doc2 = Uuid::new_v4();
        indexer.index(&json!({}), &json!({}), "g", &labels(doc1)).await.unwrap();
        indexer.index(&json!({}), &json!({}), "g", &labels(doc2)).await.unwrap();
        assert_eq!(indexer.count(), 4);
        assert_eq!(indexer.entries_for_document(&doc1).len(), 2);
    }

    #[test]
    fn empty_index_returns_zero() {
        assert_eq!(InMemoryIndexer::new().count(), 0);
    }
}
