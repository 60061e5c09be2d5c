//! Text chunking for long study material.
//!
//! Splits text into pieces of at most `max_chunk_chars` characters,
//! preferring to cut at a line break. Lengths are counted in `char`s, so a
//! multi-byte code point is never split.

use crate::config::{GenerationConfig, MAX_CHUNK_CHARS, MIN_BREAK_DISTANCE};

/// Chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Maximum characters per chunk
    pub max_chunk_chars: usize,
    /// A newline is only used as the cut point when at least this many
    /// characters past the start of the chunk
    pub min_break_distance: usize,
}

impl ChunkOptions {
    pub fn with_max_chunk_chars(mut self, max: usize) -> Self {
        self.max_chunk_chars = max;
        self
    }
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_chars: MAX_CHUNK_CHARS,
            min_break_distance: MIN_BREAK_DISTANCE,
        }
    }
}

impl From<&GenerationConfig> for ChunkOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_chunk_chars: config.max_chunk_chars,
            min_break_distance: config.min_break_distance,
        }
    }
}

/// Split `text` into ordered, trimmed, non-empty chunks.
///
/// Returns an empty vector only when `text` is blank.
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let max = options.max_chunk_chars.max(1);
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= max {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::with_capacity(chars.len() / max + 1);
    let mut offset = 0;

    while offset < chars.len() {
        let mut end = (offset + max).min(chars.len());

        if end < chars.len() {
            if let Some(rel) = chars[offset..end].iter().rposition(|&c| c == '\n') {
                if rel > 0 && rel >= options.min_break_distance {
                    end = offset + rel;
                }
            }
        }

        let piece: String = chars[offset..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        offset = end;
    }

    chunks
}
