//! JSON bodies of the HTTP API.

use docqa_rag::{AnswerResult, Citation, ConfidenceLevel, DocumentSummary, IngestReport};
use serde::{Deserialize, Serialize};

/// Round a score to 4 decimal places for display.
pub fn round_score(score: f32) -> f64 {
    (f64::from(score) * 10_000.0).round() / 10_000.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub chunk_count: usize,
    pub message: String,
}

impl From<IngestReport> for UploadResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            id: report.document_id,
            name: report.document_name,
            chunk_count: report.chunk_count,
            message: "Document uploaded successfully".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: String,
    pub deleted: bool,
    pub deleted_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// One cited passage in an [`AskResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceView {
    pub document_id: Option<String>,
    pub document_name: String,
    pub snippet: String,
    pub highlight: Option<String>,
    pub score: f64,
    pub chunk_index: Option<usize>,
}

impl From<Citation> for SourceView {
    fn from(citation: Citation) -> Self {
        Self {
            document_id: citation.document_id,
            document_name: citation.document_name,
            snippet: citation.snippet,
            highlight: citation.highlight,
            score: round_score(citation.score),
            chunk_index: citation.chunk_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<SourceView>,
    pub confidence: ConfidenceLevel,
    pub confidence_score: f64,
}

impl From<AnswerResult> for AskResponse {
    fn from(result: AnswerResult) -> Self {
        let (confidence, score) = result
            .confidence
            .map_or((ConfidenceLevel::Low, 0.0), |c| (c.level, c.score));
        Self {
            answer: result.answer,
            sources: result.citations.into_iter().map(SourceView::from).collect(),
            confidence,
            confidence_score: round_score(score),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// `connected` or `disconnected`.
    pub database: String,
    /// `connected` or `disconnected`.
    pub llm: String,
    pub documents_count: usize,
    pub chunks_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_rag::Confidence;

    #[test]
    fn scores_round_to_four_places() {
        assert_eq!(round_score(0.857_142_9), 0.8571);
        assert_eq!(round_score(0.0), 0.0);
    }

    #[test]
    fn fallback_answer_maps_to_low_confidence() {
        let response = AskResponse::from(AnswerResult::insufficient_context());
        assert!(response.sources.is_empty());
        assert_eq!(response.confidence, ConfidenceLevel::Low);
        assert_eq!(response.confidence_score, 0.0);
        assert_eq!(
            serde_json::to_value(&response).unwrap()["confidence"],
            serde_json::json!("low")
        );
    }

    #[test]
    fn citation_scores_are_rounded() {
        let result = AnswerResult {
            answer: "15 days.".into(),
            citations: vec![Citation {
                document_id: Some("doc".into()),
                document_name: "handbook.txt".into(),
                chunk_index: Some(0),
                snippet: "15 days".into(),
                score: 0.912_345,
                highlight: None,
            }],
            confidence: Some(Confidence { level: ConfidenceLevel::High, score: 0.912_345 }),
        };
        let response = AskResponse::from(result);
        assert_eq!(response.sources[0].score, 0.9123);
        assert_eq!(response.confidence_score, 0.9123);
    }
}
