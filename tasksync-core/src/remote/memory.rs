//! In-process [`RemoteStore`] used by tests and offline demos.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Document, Fields, RemoteError, RemoteStore};

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    failing_fetches: HashSet<String>,
    failing_writes: HashSet<String>,
    fetch_counts: HashMap<String, usize>,
}

/// Memory-backed document store.
///
/// Cloning is cheap; all clones share the same documents. Failures can be
/// injected per collection (fetches) or per document id (writes).
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<State>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document as-is, bypassing failure injection.
    pub async fn seed(&self, collection: &str, document: Document) {
        let mut state = self.state.lock().await;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(document.id, document.fields);
    }

    pub async fn get(&self, collection: &str, id: &str) -> Option<Fields> {
        let state = self.state.lock().await;
        state.collections.get(collection)?.get(id).cloned()
    }

    /// All documents of a collection, ordered by id.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        let state = self.state.lock().await;
        state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Makes every fetch of `collection` fail until cleared.
    pub async fn fail_fetches(&self, collection: &str) {
        let mut state = self.state.lock().await;
        state.failing_fetches.insert(collection.to_string());
    }

    /// Makes every write touching document `id` fail until cleared.
    pub async fn fail_writes_for(&self, id: &str) {
        let mut state = self.state.lock().await;
        state.failing_writes.insert(id.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failing_fetches.clear();
        state.failing_writes.clear();
    }

    /// Number of fetches issued against `collection` so far.
    pub async fn fetch_count(&self, collection: &str) -> usize {
        let state = self.state.lock().await;
        state.fetch_counts.get(collection).copied().unwrap_or(0)
    }

    /// Number of successful document writes (upserts and deletes).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn matches(fields: &Fields, field: &str, value: &str) -> bool {
    match fields.get(field) {
        Some(Value::String(s)) => s == value,
        _ => false,
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_where_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, RemoteError> {
        let mut state = self.state.lock().await;
        *state.fetch_counts.entry(collection.to_string()).or_default() += 1;

        if state.failing_fetches.contains(collection) {
            return Err(RemoteError::Unavailable(format!(
                "fetch from {} rejected",
                collection
            )));
        }

        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| matches(fields, field, value))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        if state.failing_writes.contains(id) {
            return Err(RemoteError::Unavailable(format!("write of {} rejected", id)));
        }
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn batch_upsert(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        if let Some(doc) = documents
            .iter()
            .find(|doc| state.failing_writes.contains(&doc.id))
        {
            return Err(RemoteError::Unavailable(format!(
                "batch rejected because of {}",
                doc.id
            )));
        }

        let count = documents.len();
        let docs = state.collections.entry(collection.to_string()).or_default();
        for doc in documents {
            docs.insert(doc.id, doc.fields);
        }
        self.writes.fetch_add(count, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        if state.failing_writes.contains(id) {
            return Err(RemoteError::Unavailable(format!("delete of {} rejected", id)));
        }
        if let Some(docs) = state.collections.get_mut(collection) {
            docs.remove(id);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
