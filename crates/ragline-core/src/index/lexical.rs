//! Incremental BM25 inverted index over chunks.
//!
//! Term frequencies, document frequencies, and length statistics are
//! maintained incrementally on [`add`](Bm25Index::add) and
//! [`remove_document`](Bm25Index::remove_document); no global rebuild is
//! needed for single-document operations. Scores are raw BM25 — the
//! hybrid retriever normalizes and breaks ties.

use std::collections::HashMap;

use crate::models::Chunk;

/// BM25 tuning parameters.
///
/// Defaults are k1 = 1.5, b = 0.75. Stop-word filtering is off by
/// default: recall tuning is left to the caller, and the small corpora
/// this index targets rarely benefit from it.
#[derive(Debug, Clone)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization strength.
    pub b: f64,
    /// Drop common English stop words during tokenization.
    pub stop_words: bool,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            stop_words: false,
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Inverted index with BM25 scoring. Chunks are the scoring unit; the
/// owning document id is tracked so a whole document can be removed in
/// one call.
#[derive(Debug)]
pub struct Bm25Index {
    params: Bm25Params,
    /// term → chunk id → term frequency.
    postings: HashMap<String, HashMap<String, u32>>,
    /// chunk id → its term frequencies, kept for incremental removal.
    chunk_terms: HashMap<String, HashMap<String, u32>>,
    /// chunk id → token count.
    chunk_len: HashMap<String, usize>,
    /// document id → chunk ids.
    doc_chunks: HashMap<String, Vec<String>>,
    /// Sum of all chunk token counts.
    total_len: usize,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            postings: HashMap::new(),
            chunk_terms: HashMap::new(),
            chunk_len: HashMap::new(),
            doc_chunks: HashMap::new(),
            total_len: 0,
        }
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunk_len.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_len.is_empty()
    }

    /// Tokenize with this index's stop-word setting.
    pub fn tokenize_query(&self, text: &str) -> Vec<String> {
        tokenize(text, self.params.stop_words)
    }

    /// Index one chunk. Re-adding an existing chunk id replaces its
    /// previous postings.
    pub fn add(&mut self, chunk: &Chunk) {
        if self.chunk_terms.contains_key(&chunk.id) {
            self.remove_chunk(&chunk.id);
        }

        let tokens = tokenize(&chunk.text, self.params.stop_words);
        let mut freqs: HashMap<String, u32> = HashMap::new();
        for t in &tokens {
            *freqs.entry(t.clone()).or_insert(0) += 1;
        }

        for (term, tf) in &freqs {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(chunk.id.clone(), *tf);
        }

        self.total_len += tokens.len();
        self.chunk_len.insert(chunk.id.clone(), tokens.len());
        self.chunk_terms.insert(chunk.id.clone(), freqs);
        let doc_ids = self.doc_chunks.entry(chunk.document_id.clone()).or_default();
        if !doc_ids.contains(&chunk.id) {
            doc_ids.push(chunk.id.clone());
        }
    }

    /// Remove every chunk of a document. Returns the number of chunks
    /// removed (0 when the document was never indexed).
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let chunk_ids = match self.doc_chunks.remove(document_id) {
            Some(ids) => ids,
            None => return 0,
        };
        for id in &chunk_ids {
            self.remove_chunk(id);
        }
        chunk_ids.len()
    }

    fn remove_chunk(&mut self, chunk_id: &str) {
        let Some(freqs) = self.chunk_terms.remove(chunk_id) else {
            return;
        };
        for term in freqs.keys() {
            if let Some(posting) = self.postings.get_mut(term) {
                posting.remove(chunk_id);
                if posting.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        if let Some(len) = self.chunk_len.remove(chunk_id) {
            self.total_len -= len;
        }
    }

    /// Raw BM25 score per matching chunk for the given query terms.
    ///
    /// Uses `idf = ln(1 + (N − df + 0.5) / (df + 0.5))`, which keeps IDF
    /// non-negative on small corpora.
    pub fn score(&self, terms: &[String]) -> HashMap<String, f64> {
        let mut scores: HashMap<String, f64> = HashMap::new();
        let n = self.chunk_len.len();
        if n == 0 || terms.is_empty() {
            return scores;
        }
        let avgdl = self.total_len as f64 / n as f64;

        for term in terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let df = posting.len() as f64;
            let idf = (1.0 + (n as f64 - df + 0.5) / (df + 0.5)).ln();

            for (chunk_id, &tf) in posting {
                let tf = tf as f64;
                let dl = self.chunk_len.get(chunk_id).copied().unwrap_or(0) as f64;
                let norm = self.params.k1 * (1.0 - self.params.b + self.params.b * dl / avgdl.max(1e-9));
                let contribution = idf * (tf * (self.params.k1 + 1.0)) / (tf + norm);
                *scores.entry(chunk_id.clone()).or_insert(0.0) += contribution;
            }
        }

        scores
    }
}

/// Lowercase, strip punctuation, split on whitespace.
pub fn tokenize(text: &str, stop_words: bool) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .filter(|t| !stop_words || !STOP_WORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}
