//! Section-aware document chunking.
//!
//! Text is first cut at section boundaries (markdown headings or an explicit
//! `SECTION:` marker at the start of a line), then each section is covered by
//! overlapping fixed-size character windows. No window ever spans two
//! sections, and stitching the windows of a section back together (dropping
//! the overlap of every window after the first) reproduces it exactly.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// A line starting a new section: `#`..`######` followed by a space, or `SECTION:`.
static SECTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#{1,6}(?:[ \t]|$)|SECTION:)").expect("section marker regex is valid")
});

/// A strategy for splitting document text into passages.
///
/// Output order matches source order; callers assign chunk indices by
/// position in the returned sequence.
pub trait Chunker: Send + Sync {
    /// Split `text` into chunk texts. Returns an empty `Vec` for blank text.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Splits text into sections, then into overlapping character windows.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{Chunker, SectionChunker};
///
/// let chunker = SectionChunker::new(10, 3).unwrap();
/// let chunks = chunker.chunk("abcdefghijklmno");
/// assert_eq!(chunks, vec!["abcdefghij", "hijklmno"]);
/// ```
#[derive(Debug, Clone)]
pub struct SectionChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SectionChunker {
    /// Create a new `SectionChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - window length in characters
    /// * `chunk_overlap` - characters shared by consecutive windows
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Create a chunker with the window parameters of `config`.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for SectionChunker {
    fn default() -> Self {
        let config = RagConfig::default();
        Self { chunk_size: config.chunk_size, chunk_overlap: config.chunk_overlap }
    }
}

impl Chunker for SectionChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        split_sections(text)
            .into_iter()
            .flat_map(|section| sliding_windows(section, self.chunk_size, self.chunk_overlap))
            .collect()
    }
}

/// Cut `text` into consecutive sections that concatenate back to `text`.
///
/// Each section after the first starts at a section marker line. A
/// whitespace-only preamble is folded into the first section.
pub fn split_sections(text: &str) -> Vec<&str> {
    let mut bounds: Vec<usize> = vec![0];
    bounds.extend(SECTION_MARKER.find_iter(text).map(|m| m.start()).filter(|&start| start > 0));
    bounds.push(text.len());

    if bounds.len() > 2 && text[..bounds[1]].trim().is_empty() {
        bounds.remove(1);
    }

    bounds.windows(2).map(|pair| &text[pair[0]..pair[1]]).filter(|s| !s.is_empty()).collect()
}

/// Cover `section` with windows of `size` characters advancing by
/// `size - overlap`. The last window may be shorter and is always kept.
fn sliding_windows(section: &str, size: usize, overlap: usize) -> Vec<String> {
    // Byte offset of every char boundary, including the end of the string.
    let offsets: Vec<usize> =
        section.char_indices().map(|(i, _)| i).chain(std::iter::once(section.len())).collect();
    let char_count = offsets.len() - 1;
    let step = size - overlap;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + size).min(char_count);
        windows.push(section[offsets[start]..offsets[end]].to_string());
        if end == char_count {
            break;
        }
        start += step;
    }
    windows
}
