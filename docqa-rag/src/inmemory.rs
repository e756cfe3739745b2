//! In-memory document store.
//!
//! This module provides [`InMemoryDocumentStore`], a zero-dependency store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, Document, DocumentSummary};
use crate::error::{RagError, Result};
use crate::store::DocumentStore;

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct Entry {
    document: Document,
    chunks: Vec<Chunk>,
}

/// An in-memory [`DocumentStore`].
///
/// Every mutation takes the single write guard, so a document's chunk set
/// becomes visible to readers all at once.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DocumentStore, InMemoryDocumentStore};
///
/// let store = InMemoryDocumentStore::new();
/// let document = store.save_document("notes.txt", "hello").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save_document(&self, name: &str, text: &str) -> Result<Document> {
        let document = Document::new(name, text);
        let mut entries = self.entries.write().await;
        entries
            .insert(document.id.clone(), Entry { document: document.clone(), chunks: Vec::new() });
        Ok(document)
    }

    async fn save_chunks(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(document_id).ok_or_else(|| {
            RagError::storage(BACKEND, format!("document '{document_id}' does not exist"))
        })?;
        entry.document.chunk_count = chunks.len();
        entry.chunks = chunks;
        Ok(())
    }

    async fn list_chunks_with_vectors(&self) -> Result<Vec<Chunk>> {
        let entries = self.entries.read().await;
        Ok(entries.values().flat_map(|entry| entry.chunks.iter().cloned()).collect())
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .remove(document_id)
            .ok_or_else(|| RagError::DocumentNotFound(document_id.to_string()))?;
        Ok(entry.chunks.len())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let entries = self.entries.read().await;
        let mut summaries: Vec<DocumentSummary> =
            entries.values().map(|entry| entry.document.summary()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        let entries = self.entries.read().await;
        Ok(entries.get(document_id).map(|entry| entry.document.clone()))
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn chunk_count(&self) -> Result<usize> {
        let entries = self.entries.read().await;
        Ok(entries.values().map(|entry| entry.chunks.len()).sum())
    }
}
