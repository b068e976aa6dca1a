//! Text chunking strategies for embedding generation.
//!
//! Source full text is split into chunks before vectorization. The default
//! strategy is [`RecursiveChunker`], which prefers paragraph boundaries,
//! falls back to sentence boundaries for oversized paragraphs, and finally
//! hard-splits anything that still exceeds the chunk size.

use regex::Regex;

use tabula_core::defaults;

/// Configuration for chunking strategies.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size of a chunk in characters.
    pub max_chunk_size: usize,
    /// Minimum size of a chunk in characters (smaller trailing chunks are
    /// merged into their predecessor where possible).
    pub min_chunk_size: usize,
    /// Characters of overlap between adjacent hard-split chunks.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: defaults::CHUNK_SIZE,
            min_chunk_size: defaults::CHUNK_MIN_SIZE,
            overlap: defaults::CHUNK_OVERLAP,
        }
    }
}

/// A text chunk produced by a chunker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position of this chunk in the document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
}

/// Common trait for chunking strategies.
pub trait Chunker: Send + Sync {
    /// Chunk the given text. Empty or whitespace-only input yields no chunks.
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// Get the configuration used by this chunker.
    fn config(&self) -> &ChunkerConfig;
}

/// Find a UTF-8 safe boundary at or before the given byte position.
fn char_boundary_before(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn finalize(pieces: Vec<String>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(index, text)| Chunk { index, text })
        .collect()
}

/// Splits text at paragraph boundaries (blank lines), merging adjacent
/// paragraphs up to the maximum chunk size.
#[derive(Debug, Clone)]
pub struct ParagraphChunker {
    config: ChunkerConfig,
}

impl ParagraphChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl Chunker for ParagraphChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let paragraphs: Vec<&str> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();

        for para in paragraphs {
            if !current.is_empty()
                && current.len() + 2 + para.len() > self.config.max_chunk_size
            {
                pieces.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        // Merge an undersized trailing piece into its predecessor.
        if pieces.len() >= 2 {
            let last_len = pieces[pieces.len() - 1].len();
            if last_len < self.config.min_chunk_size {
                let last = pieces.pop().unwrap_or_default();
                if let Some(prev) = pieces.last_mut() {
                    prev.push_str("\n\n");
                    prev.push_str(&last);
                }
            }
        }

        finalize(pieces)
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

/// Fixed-size chunks with configurable overlap, split at character
/// boundaries.
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    config: ChunkerConfig,
}

impl SlidingWindowChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }

        let size = self.config.max_chunk_size.max(1);
        let step = size.saturating_sub(self.config.overlap).max(1);

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < text.len() {
            let end = char_boundary_before(text, (start + size).min(text.len()));
            pieces.push(text[start..end].to_string());
            if end >= text.len() {
                break;
            }
            let next = char_boundary_before(text, start + step);
            // Guarantee forward progress even when the boundary search
            // rounds back onto the current start.
            start = if next > start { next } else { end };
        }

        finalize(pieces)
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

/// Hierarchical splitting: paragraphs first, then sentences for oversized
/// paragraphs, then a sliding window for anything still too large.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkerConfig,
    sentence_re: Regex,
}

impl RecursiveChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            // Sentence terminator followed by whitespace or end of input.
            sentence_re: Regex::new(r"[.!?]+(?:\s+|$)").unwrap(),
        }
    }

    fn split_sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut last_end = 0;
        for m in self.sentence_re.find_iter(text) {
            sentences.push(&text[last_end..m.end()]);
            last_end = m.end();
        }
        if last_end < text.len() {
            sentences.push(&text[last_end..]);
        }
        sentences
    }

    fn pack(&self, units: &[&str], joiner: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();
        for unit in units {
            let unit = unit.trim();
            if unit.is_empty() {
                continue;
            }
            if !current.is_empty()
                && current.len() + joiner.len() + unit.len() > self.config.max_chunk_size
            {
                pieces.push(std::mem::take(&mut current));
            }
            if unit.len() > self.config.max_chunk_size {
                // Unit alone exceeds the budget; hand it to the window.
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                }
                let window = SlidingWindowChunker::new(self.config.clone());
                pieces.extend(window.chunk(unit).into_iter().map(|c| c.text));
                continue;
            }
            if !current.is_empty() {
                current.push_str(joiner);
            }
            current.push_str(unit);
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return vec![];
        }

        let mut pieces = Vec::new();
        for para in text.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }
            if para.len() <= self.config.max_chunk_size {
                pieces.push(para.to_string());
            } else {
                let sentences = self.split_sentences(para);
                pieces.extend(self.pack(&sentences, " "));
            }
        }

        // Greedily merge small adjacent pieces back up to the budget.
        let mut merged: Vec<String> = Vec::new();
        for piece in pieces {
            match merged.last_mut() {
                Some(prev)
                    if prev.len() + 2 + piece.len() <= self.config.max_chunk_size
                        && prev.len() < self.config.min_chunk_size =>
                {
                    prev.push_str("\n\n");
                    prev.push_str(&piece);
                }
                _ => merged.push(piece),
            }
        }

        finalize(merged)
    }

    fn config(&self) -> &ChunkerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            max_chunk_size: 50,
            min_chunk_size: 10,
            overlap: 10,
        }
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = RecursiveChunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = RecursiveChunker::default();
        let chunks = chunker.chunk("Hello, world.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world.");
    }

    #[test]
    fn test_paragraph_chunker_respects_max_size() {
        let chunker = ParagraphChunker::new(small_config());
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 50, "chunk too large: {}", chunk.text.len());
        }
    }

    #[test]
    fn test_chunk_indices_are_sequential() {
        let chunker = ParagraphChunker::new(small_config());
        let text = "Alpha paragraph content here.\n\nBeta paragraph content here.\n\nGamma paragraph content here.";
        let chunks = chunker.chunk(text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_sliding_window_overlap() {
        let chunker = SlidingWindowChunker::new(small_config());
        let text = "a".repeat(120);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].text.len(), 50);
    }

    #[test]
    fn test_sliding_window_multibyte_safety() {
        let chunker = SlidingWindowChunker::new(small_config());
        let text = "ü".repeat(80);
        // Must not panic on char boundaries.
        let chunks = chunker.chunk(&text);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_recursive_splits_long_paragraph_at_sentences() {
        let chunker = RecursiveChunker::new(small_config());
        let text = "One short sentence. Another short one. A third sentence here. And one more to push over.";
        let chunks = chunker.chunk(text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 50);
        }
    }

    #[test]
    fn test_recursive_hard_splits_unbroken_text() {
        let chunker = RecursiveChunker::new(small_config());
        let text = "x".repeat(200);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() >= 4);
    }

    #[test]
    fn test_default_config_uses_shared_constants() {
        let config = ChunkerConfig::default();
        assert_eq!(config.max_chunk_size, defaults::CHUNK_SIZE);
        assert_eq!(config.overlap, defaults::CHUNK_OVERLAP);
    }
}
