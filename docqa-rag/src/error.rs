//! Error types for the `docqa-rag` crate.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while ingesting documents or answering questions.
///
/// Insufficient grounding is deliberately absent: a question that no chunk
/// supports produces a successful [`AnswerResult`](crate::AnswerResult)
/// carrying [`FALLBACK_ANSWER`](crate::FALLBACK_ANSWER).
#[derive(Debug, Error)]
pub enum RagError {
    /// The question was empty or whitespace only.
    #[error("question must not be empty")]
    EmptyQuestion,

    /// No chunks exist anywhere in the corpus.
    #[error("no documents available, upload documents first")]
    NoCorpus,

    /// The embedding provider was unreachable or returned malformed output.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation provider failed at the transport level.
    #[error("Generation unavailable ({provider}): {message}")]
    GenerationUnavailable {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation provider answered, but not with the expected JSON object.
    #[error("Malformed generation output: {0}")]
    MalformedGenerationOutput(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the document store backend.
    #[error("Storage error ({backend}): {message}")]
    StorageError {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The referenced document does not exist.
    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    /// A document with no non-whitespace text was submitted for ingest.
    #[error("document '{0}' is empty")]
    EmptyDocument(String),
}

/// Caller-visible classification of a [`RagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyQuestion,
    NoCorpus,
    EmbeddingUnavailable,
    GenerationUnavailable,
    MalformedGenerationOutput,
    ConfigurationError,
    StorageError,
    DocumentNotFound,
    EmptyDocument,
}

impl ErrorKind {
    /// Stable snake_case name, as used in HTTP error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyQuestion => "empty_question",
            Self::NoCorpus => "no_corpus",
            Self::EmbeddingUnavailable => "embedding_unavailable",
            Self::GenerationUnavailable => "generation_unavailable",
            Self::MalformedGenerationOutput => "malformed_generation_output",
            Self::ConfigurationError => "configuration_error",
            Self::StorageError => "storage_error",
            Self::DocumentNotFound => "document_not_found",
            Self::EmptyDocument => "empty_document",
        }
    }
}

impl RagError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuestion => ErrorKind::EmptyQuestion,
            Self::NoCorpus => ErrorKind::NoCorpus,
            Self::EmbeddingUnavailable { .. } => ErrorKind::EmbeddingUnavailable,
            Self::GenerationUnavailable { .. } => ErrorKind::GenerationUnavailable,
            Self::MalformedGenerationOutput(_) => ErrorKind::MalformedGenerationOutput,
            Self::ConfigError(_) => ErrorKind::ConfigurationError,
            Self::StorageError { .. } => ErrorKind::StorageError,
            Self::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
            Self::EmptyDocument(_) => ErrorKind::EmptyDocument,
        }
    }

    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn generation(provider: &str, message: impl Into<String>) -> Self {
        Self::GenerationUnavailable { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn storage(backend: &str, message: impl Into<String>) -> Self {
        Self::StorageError { backend: backend.to_string(), message: message.into() }
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
