//! Answer synthesis over an external generation provider.
//!
//! The provider's raw output is validated against the structured answer
//! contract before use. Citations reported by the generator are mapped back
//! onto the ranked chunks to recover scores, chunk indices and highlights.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::document::{AnswerResult, Citation, Confidence, ConfidenceLevel, ScoredChunk};
use crate::error::{RagError, Result};
use crate::prompt::{FALLBACK_ANSWER, PromptPayload};

/// A provider that turns a grounded prompt into raw model output.
///
/// Transport failures (network, timeout, rate limit, upstream 5xx) are
/// reported as [`RagError::GenerationUnavailable`]. The returned text is the
/// model's message content, unparsed.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Send the payload and return the model's text output.
    async fn generate(&self, payload: &PromptPayload) -> Result<String>;

    /// Identifier of the provider and model, used in logs and errors.
    fn name(&self) -> &str;
}

/// The structured object the generator must return.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AnswerPayload {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// One source entry of an [`AnswerPayload`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SourceRef {
    pub document_name: String,
    pub snippet: String,
}

/// Why generator output was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("output is empty")]
    Empty,
    #[error("output is not JSON: {0}")]
    NotJson(String),
    #[error("output is not a JSON object")]
    NotAnObject,
    #[error("output does not match the answer schema: {0}")]
    Schema(String),
    #[error("answer is blank")]
    BlankAnswer,
}

/// Remove a single surrounding markdown code fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// Validate raw generator output against the answer contract.
///
/// The output must be exactly one JSON object with a string `answer` and a
/// `sources` array of `{documentName, snippet}` objects. Missing keys, wrong
/// types and extra keys are all rejected.
pub fn parse_generation_output(raw: &str) -> std::result::Result<AnswerPayload, ParseError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::NotJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ParseError::NotAnObject);
    }

    let mut payload: AnswerPayload =
        serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
    payload.answer = payload.answer.trim().to_string();
    if payload.answer.is_empty() {
        return Err(ParseError::BlankAnswer);
    }
    Ok(payload)
}

/// Lowercase and collapse whitespace; strip a trailing ellipsis.
fn normalize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    collapsed.trim_end_matches("...").trim_end_matches('…').trim_end().to_string()
}

/// Find the best-ranked chunk the source refers to.
///
/// Chunks of the named document are tried first, then all chunks. A chunk
/// matches when either text contains the other after normalization.
fn match_source<'a>(source: &SourceRef, scored: &'a [ScoredChunk]) -> Option<&'a ScoredChunk> {
    let snippet = normalize(&source.snippet);
    if snippet.is_empty() {
        return None;
    }
    let contains = |candidate: &&ScoredChunk| {
        let text = normalize(&candidate.chunk.text);
        text.contains(&snippet) || (!text.is_empty() && snippet.contains(&text))
    };

    scored
        .iter()
        .filter(|s| s.chunk.document_name.eq_ignore_ascii_case(source.document_name.trim()))
        .find(contains)
        .or_else(|| scored.iter().find(contains))
}

fn to_citation(source: SourceRef, scored: &[ScoredChunk]) -> Citation {
    match match_source(&source, scored) {
        Some(matched) => {
            let snippet = source.snippet.trim();
            let highlight = if !snippet.is_empty() && matched.chunk.text.contains(snippet) {
                Some(snippet.to_string())
            } else {
                matched.highlight_text().map(str::to_string)
            };
            Citation {
                document_id: Some(matched.chunk.document_id.clone()),
                document_name: matched.chunk.document_name.clone(),
                chunk_index: Some(matched.chunk.index),
                snippet: source.snippet,
                score: matched.score,
                highlight,
            }
        }
        None => Citation {
            document_id: None,
            document_name: source.document_name,
            chunk_index: None,
            snippet: source.snippet,
            score: 0.0,
            highlight: None,
        },
    }
}

/// Confidence band from the mean score of the retrieved chunks.
pub fn confidence_for(scored: &[ScoredChunk], config: &RagConfig) -> Confidence {
    if scored.is_empty() {
        return Confidence { level: ConfidenceLevel::Low, score: 0.0 };
    }
    let mean = scored.iter().map(|s| s.score).sum::<f32>() / scored.len() as f32;
    let level = if mean >= config.high_confidence {
        ConfidenceLevel::High
    } else if mean >= config.medium_confidence {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };
    Confidence { level, score: mean }
}

/// Calls the generation provider and turns its output into an [`AnswerResult`].
pub struct AnswerSynthesizer {
    provider: Arc<dyn GenerationProvider>,
    config: RagConfig,
}

impl AnswerSynthesizer {
    pub fn new(provider: Arc<dyn GenerationProvider>, config: RagConfig) -> Self {
        Self { provider, config }
    }

    /// Return a reference to the generation provider.
    pub fn provider(&self) -> &Arc<dyn GenerationProvider> {
        &self.provider
    }

    /// Generate, validate and cite an answer for `payload`.
    ///
    /// `scored` must be the ranked chunks the payload was assembled from.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`RagError::GenerationUnavailable`], and
    /// returns [`RagError::MalformedGenerationOutput`] when the output fails
    /// [`parse_generation_output`].
    pub async fn synthesize(
        &self,
        payload: &PromptPayload,
        scored: &[ScoredChunk],
    ) -> Result<AnswerResult> {
        let raw = self.provider.generate(payload).await?;
        debug!(provider = self.provider.name(), output_len = raw.len(), "generation returned");

        let parsed = parse_generation_output(&raw).map_err(|e| {
            error!(provider = self.provider.name(), error = %e, "rejected generation output");
            RagError::MalformedGenerationOutput(e.to_string())
        })?;

        if parsed.answer == FALLBACK_ANSWER {
            return Ok(AnswerResult::insufficient_context());
        }

        let citations = parsed.sources.into_iter().map(|s| to_citation(s, scored)).collect();
        Ok(AnswerResult {
            answer: parsed.answer,
            citations,
            confidence: Some(confidence_for(scored, &self.config)),
        })
    }
}
