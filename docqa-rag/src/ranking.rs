//! Similarity ranking of stored chunks against a question embedding.
//!
//! Ranking is an exhaustive linear scan. Scores are cosine similarities
//! rescaled from `[-1, 1]` into `[0, 1]`, and the result set is cut by an
//! adaptive floor that rides [`RagConfig::floor_margin`] below the best score
//! but never drops under [`RagConfig::min_score`].

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::document::{Chunk, ScoredChunk};

/// Compute the cosine similarity of two vectors, clamped to `[-1, 1]`.
///
/// Returns `None` if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    if cosine.is_nan() {
        return None;
    }
    Some(cosine.clamp(-1.0, 1.0) as f32)
}

/// Similarity score on the `[0, 1]` scale: `(cos + 1) / 2`.
///
/// Zero-magnitude or mismatched vectors score 0.
pub fn similarity_score(a: &[f32], b: &[f32]) -> f32 {
    match cosine_similarity(a, b) {
        Some(cosine) => ((cosine + 1.0) / 2.0).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Scores candidate chunks against a question and keeps the relevant ones.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{RagConfig, SimilarityRanker};
///
/// let ranker = SimilarityRanker::from_config(&RagConfig::default());
/// let ranked = ranker.rank(&question_vector, chunks);
/// ```
#[derive(Debug, Clone)]
pub struct SimilarityRanker {
    top_k: usize,
    min_score: f32,
    floor_margin: f32,
    dedupe: bool,
}

impl SimilarityRanker {
    /// Create a ranker with the default floor margin and duplicate suppression on.
    pub fn new(top_k: usize, min_score: f32) -> Self {
        let defaults = RagConfig::default();
        Self { top_k, min_score, floor_margin: defaults.floor_margin, dedupe: true }
    }

    /// Create a ranker with the ranking parameters of `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            top_k: config.top_k,
            min_score: config.min_score,
            floor_margin: config.floor_margin,
            dedupe: config.dedupe_candidates,
        }
    }

    /// Set how far below the best score the floor sits.
    pub fn with_floor_margin(mut self, margin: f32) -> Self {
        self.floor_margin = margin;
        self
    }

    /// Enable or disable exact-duplicate suppression.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// The floor applied for a given best score.
    pub fn adaptive_floor(&self, top_similarity: f32) -> f32 {
        self.min_score.max(top_similarity - self.floor_margin)
    }

    /// Rank `candidates` against `question`.
    ///
    /// 1. Score every candidate.
    /// 2. Sort by descending score, then ascending chunk index, then
    ///    ascending document ID.
    /// 3. Keep the first `top_k`.
    /// 4. Keep those scoring at least `max(min_score, best - floor_margin)`.
    /// 5. Optionally drop repeats of an earlier `(document_id, text)`.
    ///
    /// Candidates whose embedding dimensionality differs from the question's
    /// are skipped. An empty result means the corpus holds nothing relevant.
    pub fn rank<I>(&self, question: &[f32], candidates: I) -> Vec<ScoredChunk>
    where
        I: IntoIterator<Item = Chunk>,
    {
        let mut skipped = 0usize;
        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter_map(|chunk| {
                if chunk.embedding.len() != question.len() {
                    skipped += 1;
                    return None;
                }
                let score = similarity_score(question, &chunk.embedding);
                Some(ScoredChunk { chunk, score, highlight: None })
            })
            .collect();

        if skipped > 0 {
            warn!(
                skipped,
                dimensions = question.len(),
                "skipped chunks with mismatched embedding dimensionality"
            );
        }

        scored.sort_by(compare_ranked);
        scored.truncate(self.top_k);

        let top_similarity = scored.first().map_or(0.0, |s| s.score);
        let floor = self.adaptive_floor(top_similarity);
        let considered = scored.len();
        scored.retain(|s| s.score >= floor);

        if self.dedupe {
            let mut seen = HashSet::new();
            scored.retain(|s| seen.insert((s.chunk.document_id.clone(), s.chunk.text.clone())));
        }

        debug!(considered, kept = scored.len(), top_similarity, floor, "ranked candidates");
        scored
    }
}

impl Default for SimilarityRanker {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Descending score, then ascending chunk index, document ID and chunk ID.
fn compare_ranked(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.index.cmp(&b.chunk.index))
        .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(document_id: &str, index: usize, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: format!("{document_id}_{index}"),
            document_id: document_id.to_string(),
            document_name: format!("{document_id}.txt"),
            index,
            text: text.to_string(),
            embedding,
        }
    }

    #[test]
    fn identical_vectors_score_one_and_opposite_score_zero() {
        assert!((similarity_score(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(similarity_score(&[1.0, 0.0], &[-1.0, 0.0]).abs() < 1e-6);
        assert!((similarity_score(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_magnitude_scores_zero() {
        assert_eq!(similarity_score(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(similarity_score(&[], &[]), 0.0);
    }

    #[test]
    fn floor_rides_below_best_score() {
        let ranker = SimilarityRanker::new(10, 0.40);
        assert!((ranker.adaptive_floor(0.95) - 0.80).abs() < 1e-6);
        assert!((ranker.adaptive_floor(0.50) - 0.40).abs() < 1e-6);
        assert!((ranker.adaptive_floor(0.0) - 0.40).abs() < 1e-6);
    }

    #[test]
    fn distant_candidates_are_cut_by_the_floor() {
        let ranker = SimilarityRanker::new(10, 0.40);
        let ranked = ranker.rank(
            &[1.0, 0.0],
            vec![
                chunk("a", 0, "close", vec![1.0, 0.0]),
                chunk("b", 0, "near", vec![0.9, 0.1]),
                chunk("c", 0, "orthogonal", vec![0.0, 1.0]),
            ],
        );
        let texts: Vec<&str> = ranked.iter().map(|s| s.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["close", "near"]);
    }

    #[test]
    fn ties_break_by_index_then_document() {
        let ranker = SimilarityRanker::new(10, 0.0);
        let ranked = ranker.rank(
            &[1.0],
            vec![
                chunk("b", 1, "b1", vec![1.0]),
                chunk("b", 0, "b0", vec![1.0]),
                chunk("a", 1, "a1", vec![1.0]),
            ],
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b_0", "a_1", "b_1"]);
    }

    #[test]
    fn top_k_limits_before_the_floor() {
        let ranker = SimilarityRanker::new(1, 0.0);
        let ranked = ranker.rank(
            &[1.0, 0.0],
            vec![chunk("a", 0, "x", vec![1.0, 0.0]), chunk("a", 1, "y", vec![1.0, 0.01])],
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.index, 0);
    }

    #[test]
    fn duplicate_text_in_one_document_is_suppressed() {
        let candidates = vec![
            chunk("a", 0, "same", vec![1.0, 0.0]),
            chunk("a", 3, "same", vec![1.0, 0.0]),
            chunk("b", 0, "same", vec![1.0, 0.0]),
        ];
        let ranked = SimilarityRanker::new(10, 0.4).rank(&[1.0, 0.0], candidates.clone());
        assert_eq!(ranked.len(), 2);

        let ranked =
            SimilarityRanker::new(10, 0.4).with_dedupe(false).rank(&[1.0, 0.0], candidates);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let ranked = SimilarityRanker::new(10, 0.0)
            .rank(&[1.0, 0.0], vec![chunk("a", 0, "short", vec![1.0])]);
        assert!(ranked.is_empty());
    }

    #[test]
    fn no_candidates_rank_to_nothing() {
        assert!(SimilarityRanker::default().rank(&[1.0], Vec::new()).is_empty());
    }
}
