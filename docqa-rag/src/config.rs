//! Configuration for the retrieval pipeline.
//!
//! Every tunable of chunking, ranking and confidence banding lives in
//! [`RagConfig`], which is passed explicitly to the components that need it.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Window size in characters.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive windows of a section.
    pub chunk_overlap: usize,
    /// Number of best-scoring candidates considered before the adaptive floor.
    pub top_k: usize,
    /// Absolute lower bound of the adaptive floor, on the 0–1 score scale.
    pub min_score: f32,
    /// Distance below the best score at which the adaptive floor sits.
    pub floor_margin: f32,
    /// Drop candidates repeating the `(document, text)` of a better candidate.
    pub dedupe_candidates: bool,
    /// Mean score at or above which an answer is reported with high confidence.
    pub high_confidence: f32,
    /// Mean score at or above which an answer is reported with medium confidence.
    pub medium_confidence: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 400,
            chunk_overlap: 100,
            top_k: 10,
            min_score: 0.40,
            floor_margin: 0.15,
            dedupe_candidates: true,
            high_confidence: 0.52,
            medium_confidence: 0.49,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - a score threshold lies outside `[0, 1]`
    /// - `medium_confidence > high_confidence`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        for (name, value) in [
            ("min_score", self.min_score),
            ("floor_margin", self.floor_margin),
            ("high_confidence", self.high_confidence),
            ("medium_confidence", self.medium_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::ConfigError(format!(
                    "{name} ({value}) must be within [0, 1]"
                )));
            }
        }
        if self.medium_confidence > self.high_confidence {
            return Err(RagError::ConfigError(format!(
                "medium_confidence ({}) must not exceed high_confidence ({})",
                self.medium_confidence, self.high_confidence
            )));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the window size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive windows in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of candidates kept before the adaptive floor.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the absolute minimum score.
    pub fn min_score(mut self, score: f32) -> Self {
        self.config.min_score = score;
        self
    }

    /// Set how far below the best score the adaptive floor sits.
    pub fn floor_margin(mut self, margin: f32) -> Self {
        self.config.floor_margin = margin;
        self
    }

    /// Enable or disable exact-duplicate suppression.
    pub fn dedupe_candidates(mut self, enabled: bool) -> Self {
        self.config.dedupe_candidates = enabled;
        self
    }

    /// Set the confidence band thresholds.
    pub fn confidence_thresholds(mut self, high: f32, medium: f32) -> Self {
        self.config.high_confidence = high;
        self.config.medium_confidence = medium;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
