//! Sentence-boundary text chunker with overlap windows.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` bytes,
//! preferring to end each chunk at a sentence boundary (terminal
//! punctuation followed by whitespace). Consecutive chunks overlap by up
//! to `overlap` bytes so that retrieval does not lose context at chunk
//! edges.
//!
//! # Algorithm
//!
//! 1. Scan the text once, recording sentence-end offsets.
//! 2. From the current position, extend the chunk to the furthest
//!    sentence end that still fits within `chunk_size`.
//! 3. If the sentence spanning the current position is itself larger
//!    than `chunk_size`, hard-split at the byte limit (snapped back to a
//!    UTF-8 character boundary) — content is never dropped.
//! 4. Start the next chunk `overlap` bytes before the previous chunk's
//!    end, giving up overlap when the next sentence would not fit the
//!    size budget otherwise; already-fully-covered content is never
//!    re-emitted.
//!
//! Chunk text is the exact slice of the source, so concatenating chunk
//! texts with the overlap regions removed reconstructs the document
//! byte-for-byte. Sizes and offsets are byte-based; every boundary lands
//! on a valid character boundary.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// Chunk sizing parameters.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in bytes.
    pub chunk_size: usize,
    /// Maximum overlap between consecutive chunks, in bytes.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// Deterministic document-to-chunks splitter.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Validates the configuration up front: `chunk_size` must be
    /// positive and strictly larger than `overlap`.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::Configuration("chunk_size must be > 0".into()));
        }
        if config.overlap >= config.chunk_size {
            return Err(RagError::Configuration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                config.overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split `text` into ordered chunks. Deterministic for identical
    /// inputs; returns an empty vector for empty text.
    pub fn split(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let ends = sentence_ends(text);
        let mut chunks: Vec<Chunk> = Vec::new();
        // Byte offset up to which the text has been emitted. Every chunk
        // must end past it, so fully-covered content is never re-emitted.
        let mut covered = 0usize;

        while covered < text.len() {
            // A chunk may start at most `overlap` before `covered` and
            // never leaves a gap, so its end can reach at most this far.
            let reach = covered.saturating_add(self.config.chunk_size);

            // Furthest sentence end within reach.
            let mut end = None;
            for &e in &ends {
                if e <= covered {
                    continue;
                }
                if e > reach {
                    break;
                }
                end = Some(e);
            }

            let (start, end) = match end {
                Some(e) => {
                    // Sentence-aligned chunk. Back up for overlap as far
                    // as the size budget allows.
                    let min_start = e.saturating_sub(self.config.chunk_size);
                    let desired = covered.saturating_sub(self.config.overlap);
                    (snap_ceil(text, desired.max(min_start)), e)
                }
                None => {
                    // The sentence spanning `covered` runs past the
                    // reach: hard-split at the byte limit.
                    let start = snap_ceil(text, covered.saturating_sub(self.config.overlap));
                    let mut end = snap_to_char_boundary(
                        text,
                        start.saturating_add(self.config.chunk_size).min(text.len()),
                    );
                    if end <= covered {
                        end = next_char_boundary(text, covered);
                    }
                    (start, end)
                }
            };

            chunks.push(make_chunk(document_id, chunks.len() as i64, text, start, end));
            covered = end;
        }

        chunks
    }
}

/// Offsets one past each sentence end. A sentence ends at terminal
/// punctuation followed by whitespace; the trailing whitespace run
/// belongs to the sentence so chunks start on content. The final offset
/// is always `text.len()`.
fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let followed_by_space = matches!(chars.peek(), Some(&(_, next)) if next.is_whitespace());
        if !followed_by_space {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            end = j + w.len_utf8();
            chars.next();
        }
        ends.push(end);
    }

    if ends.last().copied() != Some(text.len()) {
        ends.push(text.len());
    }
    ends
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn snap_ceil(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The first char boundary strictly after `index`.
fn next_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index + 1;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}

fn make_chunk(document_id: &str, seq: i64, text: &str, start: usize, end: usize) -> Chunk {
    let slice = &text[start..end];
    let mut hasher = Sha256::new();
    hasher.update(slice.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        seq,
        text: slice.to_string(),
        start,
        end,
        hash,
        embedding: None,
    }
}
