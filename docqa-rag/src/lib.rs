//! Retrieval-and-grounding pipeline for question answering over a private
//! document corpus.
//!
//! This crate provides:
//! - Section-aware sliding-window chunking
//! - Embedding and generation provider traits, with OpenAI-compatible
//!   adapters behind the `openai` feature
//! - Cosine ranking with an adaptive relevance floor
//! - Prompt assembly and validation of the generator's structured answer
//! - Document stores: in-memory, and SQLite behind the `sqlite` feature
//! - [`RetrievalOrchestrator`], which wires the above into ingest and ask flows
//!
//! Questions the corpus cannot support are answered with
//! [`FALLBACK_ANSWER`] and no citations, without calling the generator.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod highlight;
pub mod inmemory;
pub mod pipeline;
pub mod prompt;
pub mod ranking;
pub mod store;
pub mod synthesis;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chunking::{Chunker, SectionChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    AnswerResult, Chunk, Citation, Confidence, ConfidenceLevel, CorpusStats, Document,
    DocumentSummary, IngestReport, ScoredChunk, TextSpan,
};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use inmemory::InMemoryDocumentStore;
pub use pipeline::{AskStage, AskTrace, RetrievalOrchestrator, RetrievalOrchestratorBuilder};
pub use prompt::{FALLBACK_ANSWER, PromptPayload};
pub use ranking::SimilarityRanker;
pub use store::DocumentStore;
pub use synthesis::{AnswerSynthesizer, GenerationProvider};

#[cfg(feature = "openai")]
pub use openai::{AppAttribution, OpenAIEmbeddingProvider, OpenAIGenerationProvider};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;
