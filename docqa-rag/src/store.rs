//! Document store trait: persistence of documents and their embedded chunks.

use async_trait::async_trait;

use crate::document::{Chunk, Document, DocumentSummary};
use crate::error::Result;

/// A storage backend for documents and their chunk vectors.
///
/// Implementations must make [`save_chunks`](DocumentStore::save_chunks)
/// atomic with respect to readers: a concurrent
/// [`list_chunks_with_vectors`](DocumentStore::list_chunks_with_vectors)
/// sees either all chunks of a document or none of them, and a document's
/// `chunk_count` always equals the number of chunks stored for it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{DocumentStore, InMemoryDocumentStore};
///
/// let store = InMemoryDocumentStore::new();
/// let document = store.save_document("handbook.txt", text).await?;
/// store.save_chunks(&document.id, chunks).await?;
/// let snapshot = store.list_chunks_with_vectors().await?;
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new document with no chunks and return it.
    async fn save_document(&self, name: &str, text: &str) -> Result<Document>;

    /// Store the complete, ordered chunk set of a document in one step.
    ///
    /// Sets the document's `chunk_count` to `chunks.len()`.
    async fn save_chunks(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<()>;

    /// Snapshot of every stored chunk, embeddings included.
    async fn list_chunks_with_vectors(&self) -> Result<Vec<Chunk>>;

    /// Delete a document and all its chunks. Returns the number of chunks removed.
    ///
    /// Returns [`RagError::DocumentNotFound`](crate::RagError::DocumentNotFound)
    /// if the document does not exist.
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// All documents without their text, oldest first.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// Fetch one document, text included.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// Number of stored documents.
    async fn document_count(&self) -> Result<usize>;

    /// Number of stored chunks across all documents.
    async fn chunk_count(&self) -> Result<usize>;
}
