//! Data types for documents, chunks, ranked candidates and answers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prompt::FALLBACK_ANSWER;

/// An uploaded source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// Display name, usually the uploaded file name.
    pub name: String,
    /// The full text content.
    pub text: String,
    /// When the document was stored.
    pub created_at: DateTime<Utc>,
    /// Number of chunks currently owned by this document.
    pub chunk_count: usize,
}

impl Document {
    /// Create a document with a fresh identifier and no chunks.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            text: text.into(),
            created_at: Utc::now(),
            chunk_count: 0,
        }
    }

    /// The document without its text.
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            chunk_count: self.chunk_count,
        }
    }
}

/// A [`Document`] listing entry without the text body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub chunk_count: usize,
}

/// A passage of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The parent document's name, copied for citation display.
    pub document_name: String,
    /// Zero-based position within the parent document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Build the chunk at `index` of `document`.
    pub fn new(document: &Document, index: usize, text: String, embedding: Vec<f32>) -> Self {
        Self {
            id: format!("{}_{index}", document.id),
            document_id: document.id.clone(),
            document_name: document.name.clone(),
            index,
            text,
            embedding,
        }
    }
}

/// A byte range inside a chunk's text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    /// The spanned slice of `text`, or `None` if the span does not fit it.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// A retrieved [`Chunk`] paired with its rescaled similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity rescaled into `[0, 1]`.
    pub score: f32,
    /// The most question-relevant sentence of the chunk, once selected.
    pub highlight: Option<TextSpan>,
}

impl ScoredChunk {
    /// The highlighted text, if a highlight has been selected.
    pub fn highlight_text(&self) -> Option<&str> {
        self.highlight.and_then(|span| span.slice(&self.chunk.text))
    }
}

/// A source reference attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Parent document of the matched chunk; `None` when no chunk matched.
    pub document_id: Option<String>,
    /// Document name as reported by the generator.
    pub document_name: String,
    /// Zero-based index of the matched chunk.
    pub chunk_index: Option<usize>,
    /// Supporting excerpt as reported by the generator.
    pub snippet: String,
    /// Similarity score of the matched chunk, 0 when unmatched.
    pub score: f32,
    /// Highlighted passage of the matched chunk.
    pub highlight: Option<String>,
}

/// Coarse confidence band of an answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(label)
    }
}

/// Confidence band plus the mean score it was derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    pub score: f32,
}

/// The outcome of a successful ask.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: Option<Confidence>,
}

impl AnswerResult {
    /// The fixed "not enough information" result, with no sources.
    pub fn insufficient_context() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            citations: Vec::new(),
            confidence: Some(Confidence { level: ConfidenceLevel::Low, score: 0.0 }),
        }
    }

    /// Whether the answer is exactly the fallback sentence.
    pub fn is_insufficient_context(&self) -> bool {
        self.answer == FALLBACK_ANSWER
    }
}

/// The outcome of ingesting one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub document_id: String,
    pub document_name: String,
    pub chunk_count: usize,
}

/// Corpus size counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorpusStats {
    pub documents: usize,
    pub chunks: usize,
}
