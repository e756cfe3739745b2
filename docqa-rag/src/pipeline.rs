//! Retrieval orchestrator.
//!
//! The [`RetrievalOrchestrator`] coordinates the ingest flow
//! (chunk → embed → store) and the ask flow
//! (validate → embed → rank → assemble → synthesize) by composing a
//! [`Chunker`], an [`EmbeddingProvider`], a [`DocumentStore`], a
//! [`SimilarityRanker`] and an [`AnswerSynthesizer`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::{InMemoryDocumentStore, RagConfig, RetrievalOrchestrator};
//!
//! let orchestrator = RetrievalOrchestrator::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .generation_provider(Arc::new(my_generator))
//!     .store(Arc::new(InMemoryDocumentStore::new()))
//!     .build()?;
//!
//! orchestrator.ingest("handbook.txt", &text).await?;
//! let answer = orchestrator.ask("How many vacation days do I get?").await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, SectionChunker};
use crate::config::RagConfig;
use crate::document::{AnswerResult, Chunk, CorpusStats, Document, DocumentSummary, IngestReport};
use crate::embedding::{EmbeddingProvider, check_dimensions};
use crate::error::{ErrorKind, RagError, Result};
use crate::highlight::select_highlight;
use crate::prompt::assemble;
use crate::ranking::SimilarityRanker;
use crate::store::DocumentStore;
use crate::synthesis::{AnswerSynthesizer, GenerationProvider};

/// A state of the ask flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskStage {
    Validating,
    Embedding,
    Ranking,
    /// Nothing cleared the floor; the fallback answer is returned without generation.
    ShortCircuitFallback,
    Assembling,
    Synthesizing,
    Done,
    Failed(ErrorKind),
}

impl fmt::Display for AskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::Embedding => f.write_str("embedding"),
            Self::Ranking => f.write_str("ranking"),
            Self::ShortCircuitFallback => f.write_str("short_circuit_fallback"),
            Self::Assembling => f.write_str("assembling"),
            Self::Synthesizing => f.write_str("synthesizing"),
            Self::Done => f.write_str("done"),
            Self::Failed(kind) => write!(f, "failed({})", kind.as_str()),
        }
    }
}

/// The stages an ask visited, ending in `Done` or `Failed`, plus its result.
#[derive(Debug)]
pub struct AskTrace {
    pub stages: Vec<AskStage>,
    pub result: Result<AnswerResult>,
}

impl AskTrace {
    /// The terminal stage.
    pub fn terminal(&self) -> Option<AskStage> {
        self.stages.last().copied()
    }
}

fn enter(stages: &mut Vec<AskStage>, stage: AskStage) {
    debug!(%stage, "ask stage");
    stages.push(stage);
}

/// The retrieval orchestrator.
///
/// Holds no mutable state of its own: every ask ranks against a fresh
/// snapshot of the store, and nothing is persisted while answering.
/// Construct one via [`RetrievalOrchestrator::builder()`].
pub struct RetrievalOrchestrator {
    config: RagConfig,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    ranker: SimilarityRanker,
    synthesizer: AnswerSynthesizer,
}

impl RetrievalOrchestrator {
    /// Create a new [`RetrievalOrchestratorBuilder`].
    pub fn builder() -> RetrievalOrchestratorBuilder {
        RetrievalOrchestratorBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the generation provider.
    pub fn generation_provider(&self) -> &Arc<dyn GenerationProvider> {
        self.synthesizer.provider()
    }

    /// Return a reference to the document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Embed `texts`, calling the provider once per distinct text.
    async fn embed_chunks(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut distinct: Vec<&str> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let positions: Vec<usize> = texts
            .iter()
            .map(|text| {
                *slots.entry(text.as_str()).or_insert_with(|| {
                    distinct.push(text.as_str());
                    distinct.len() - 1
                })
            })
            .collect();

        let vectors = self.embedding_provider.embed_many(&distinct).await?;
        if vectors.len() != distinct.len() {
            return Err(RagError::embedding(
                self.embedding_provider.name(),
                format!("expected {} embeddings, got {}", distinct.len(), vectors.len()),
            ));
        }
        for vector in &vectors {
            check_dimensions(self.embedding_provider.as_ref(), vector)?;
        }

        Ok(positions.into_iter().map(|slot| vectors[slot].clone()).collect())
    }

    /// Ingest a document: chunk → embed → store.
    ///
    /// All chunks are embedded before anything is written, and the chunk set
    /// is committed in one store call. If that call fails the document row is
    /// removed again, so a failed ingest leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyDocument`] for blank text,
    /// [`RagError::EmbeddingUnavailable`] if embedding fails (nothing is
    /// stored), or the store's error.
    pub async fn ingest(&self, name: &str, raw_text: &str) -> Result<IngestReport> {
        if raw_text.trim().is_empty() {
            return Err(RagError::EmptyDocument(name.to_string()));
        }

        let texts = self.chunker.chunk(raw_text);
        debug!(document.name = name, chunk_count = texts.len(), "chunked document");

        let vectors = self.embed_chunks(&texts).await.map_err(|e| {
            error!(document.name = name, error = %e, "embedding failed during ingestion");
            e
        })?;

        let document = self.store.save_document(name, raw_text).await?;
        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, embedding))| Chunk::new(&document, index, text, embedding))
            .collect();
        let chunk_count = chunks.len();

        if let Err(e) = self.store.save_chunks(&document.id, chunks).await {
            error!(document.id = %document.id, error = %e, "storing chunks failed, rolling back");
            if let Err(cleanup) = self.store.delete_document(&document.id).await {
                warn!(document.id = %document.id, error = %cleanup, "rollback failed");
            }
            return Err(e);
        }

        info!(document.id = %document.id, document.name = name, chunk_count, "ingested document");
        Ok(IngestReport { document_id: document.id, document_name: document.name, chunk_count })
    }

    /// Answer `question` from the stored corpus.
    ///
    /// Returns the fixed fallback answer with no citations when no chunk is
    /// relevant enough; that is a success, not an error.
    ///
    /// # Errors
    ///
    /// [`RagError::EmptyQuestion`] and [`RagError::NoCorpus`] before any
    /// provider call; otherwise the provider or store error that stopped the flow.
    pub async fn ask(&self, question: &str) -> Result<AnswerResult> {
        self.ask_traced(question).await.result
    }

    /// Like [`ask`](Self::ask), also reporting the stages visited.
    pub async fn ask_traced(&self, question: &str) -> AskTrace {
        let mut stages = Vec::new();
        let result = self.run_ask(question, &mut stages).await;
        match &result {
            Ok(answer) => {
                enter(&mut stages, AskStage::Done);
                info!(citations = answer.citations.len(), "question answered");
            }
            Err(e) => {
                enter(&mut stages, AskStage::Failed(e.kind()));
                warn!(error = %e, "question failed");
            }
        }
        AskTrace { stages, result }
    }

    async fn run_ask(&self, question: &str, stages: &mut Vec<AskStage>) -> Result<AnswerResult> {
        enter(stages, AskStage::Validating);
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }
        if self.store.chunk_count().await? == 0 {
            return Err(RagError::NoCorpus);
        }

        enter(stages, AskStage::Embedding);
        let question_vector = self.embedding_provider.embed(question).await?;
        check_dimensions(self.embedding_provider.as_ref(), &question_vector)?;

        enter(stages, AskStage::Ranking);
        let snapshot = self.store.list_chunks_with_vectors().await?;
        if snapshot.is_empty() {
            return Err(RagError::NoCorpus);
        }
        let mut ranked = self.ranker.rank(&question_vector, snapshot);
        for scored in &mut ranked {
            scored.highlight = select_highlight(&scored.chunk.text, question);
        }

        if ranked.is_empty() {
            enter(stages, AskStage::ShortCircuitFallback);
            return Ok(AnswerResult::insufficient_context());
        }

        enter(stages, AskStage::Assembling);
        let payload = assemble(question, &ranked);

        enter(stages, AskStage::Synthesizing);
        self.synthesizer.synthesize(&payload, &ranked).await
    }

    /// All documents, oldest first.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.store.list_documents().await
    }

    /// Fetch one document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentNotFound`] if it does not exist.
    pub async fn get_document(&self, document_id: &str) -> Result<Document> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| RagError::DocumentNotFound(document_id.to_string()))
    }

    /// Delete a document and its chunks, returning the number of chunks removed.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let deleted_chunks = self.store.delete_document(document_id).await?;
        info!(document.id = document_id, deleted_chunks, "deleted document");
        Ok(deleted_chunks)
    }

    /// Document and chunk counts.
    pub async fn stats(&self) -> Result<CorpusStats> {
        Ok(CorpusStats {
            documents: self.store.document_count().await?,
            chunks: self.store.chunk_count().await?,
        })
    }
}

/// Builder for constructing a [`RetrievalOrchestrator`].
///
/// The embedding provider, generation provider and store are required. The
/// config defaults to [`RagConfig::default()`] and the chunker to a
/// [`SectionChunker`] built from the config.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = RetrievalOrchestrator::builder()
///     .embedding_provider(Arc::new(embedder))
///     .generation_provider(Arc::new(generator))
///     .store(Arc::new(store))
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalOrchestratorBuilder {
    config: Option<RagConfig>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl RetrievalOrchestratorBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default section chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider used for both chunks and questions.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Set the document store.
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`RetrievalOrchestrator`], validating the config and required fields.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the config is invalid or a
    /// required field is missing.
    pub fn build(self) -> Result<RetrievalOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let generation_provider = self
            .generation_provider
            .ok_or_else(|| RagError::ConfigError("generation_provider is required".to_string()))?;
        let store =
            self.store.ok_or_else(|| RagError::ConfigError("store is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(SectionChunker::from_config(&config)?),
        };

        Ok(RetrievalOrchestrator {
            ranker: SimilarityRanker::from_config(&config),
            synthesizer: AnswerSynthesizer::new(generation_provider, config.clone()),
            config,
            chunker,
            embedding_provider,
            store,
        })
    }
}
