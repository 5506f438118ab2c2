//! Hybrid retrieval: lexical + vector candidate pools fused into one
//! ranking.
//!
//! # Scoring
//!
//! 1. Fetch up to `pool_size` candidates from the BM25 index and up to
//!    `pool_size` from the vector index (per the search mode).
//! 2. Min-max normalize each pool independently to `[0, 1]`. An empty or
//!    constant pool normalizes to `0.0` for every member — there is no
//!    spread to express, and this avoids a divide by zero.
//! 3. Fuse: `score = alpha · vector + (1 − alpha) · lexical`. A chunk
//!    absent from one pool contributes `0.0` from that side.
//! 4. Sort by fused score descending, ties broken by chunk id ascending
//!    so identical inputs always produce identical orderings.
//! 5. Truncate to `limit` and assign 1-based ranks.
//!
//! BM25 scores and vector similarities live on incomparable scales;
//! normalizing each pool before blending is the standard correction, and
//! `alpha` lets each request trade keyword recall against semantic
//! recall.

use std::collections::HashMap;

use crate::error::{RagError, Result};
use crate::index::DocumentIndex;
use crate::models::RetrievalResult;

/// How to combine the two indexes for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// BM25 only.
    Lexical,
    /// Vector similarity only.
    Vector,
    /// Weighted blend; `alpha` is the vector share in `[0, 1]`.
    Hybrid { alpha: f64 },
}

impl SearchMode {
    /// Parse a mode name as used on the HTTP/CLI surface. `alpha` only
    /// applies to hybrid mode; absent, `default_alpha` is used.
    pub fn parse(mode: &str, alpha: Option<f64>, default_alpha: f64) -> Result<Self> {
        let parsed = match mode {
            "lexical" | "keyword" | "bm25" => SearchMode::Lexical,
            "vector" | "semantic" => SearchMode::Vector,
            "hybrid" => SearchMode::Hybrid {
                alpha: alpha.unwrap_or(default_alpha),
            },
            other => {
                return Err(RagError::Configuration(format!(
                    "unknown search mode '{}': use lexical, vector, or hybrid",
                    other
                )))
            }
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if let SearchMode::Hybrid { alpha } = self {
            if !(0.0..=1.0).contains(alpha) {
                return Err(RagError::Configuration(format!(
                    "alpha must be in [0.0, 1.0], got {}",
                    alpha
                )));
            }
        }
        Ok(())
    }

    /// Effective vector weight.
    pub fn alpha(&self) -> f64 {
        match self {
            SearchMode::Lexical => 0.0,
            SearchMode::Vector => 1.0,
            SearchMode::Hybrid { alpha } => *alpha,
        }
    }

    pub fn uses_lexical(&self) -> bool {
        !matches!(self, SearchMode::Vector)
    }

    pub fn uses_vector(&self) -> bool {
        !matches!(self, SearchMode::Lexical)
    }
}

/// Retrieval tuning for one query.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Maximum results returned.
    pub limit: usize,
    /// Candidate pool fetched from each side before fusion.
    pub pool_size: usize,
    pub mode: SearchMode,
}

impl RetrievalParams {
    /// Default pool: 4× the limit, large enough that fusion is not
    /// starved by either side.
    pub fn new(limit: usize, mode: SearchMode) -> Self {
        Self {
            limit,
            pool_size: limit.saturating_mul(4).max(limit),
            mode,
        }
    }
}

/// Run one retrieval against the shared index.
///
/// `query_vec` is required for vector and hybrid modes (the caller embeds
/// the query via its collaborator). Holds read guards on both indexes for
/// the duration, so results are a consistent snapshot.
pub fn retrieve(
    index: &DocumentIndex,
    query_text: &str,
    query_vec: Option<&[f32]>,
    params: &RetrievalParams,
) -> Result<Vec<RetrievalResult>> {
    params.mode.validate()?;
    if params.limit == 0 {
        return Err(RagError::Configuration("limit must be >= 1".into()));
    }
    if query_text.trim().is_empty() {
        return Ok(Vec::new());
    }

    // Lock order: docs → chunks → lexical → vector.
    let docs = index.docs.read().unwrap();
    let chunks = index.chunks.read().unwrap();
    let lexical = index.lexical.read().unwrap();
    let vector = index.vector.read().unwrap();

    let lexical_pool: Vec<(String, f64)> = if params.mode.uses_lexical() {
        let terms = lexical.tokenize_query(query_text);
        let mut scored: Vec<(String, f64)> = lexical.score(&terms).into_iter().collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(params.pool_size);
        scored
    } else {
        Vec::new()
    };

    let vector_pool: Vec<(String, f64)> = if params.mode.uses_vector() {
        let qv = query_vec.ok_or_else(|| {
            RagError::Configuration("query embedding required for vector/hybrid mode".into())
        })?;
        vector
            .query(qv, params.pool_size)
            .into_iter()
            .map(|hit| (hit.chunk_id, hit.score))
            .collect()
    } else {
        Vec::new()
    };

    if lexical_pool.is_empty() && vector_pool.is_empty() {
        return Ok(Vec::new());
    }

    let lexical_norm = normalize(&lexical_pool);
    let vector_norm = normalize(&vector_pool);

    let mut candidate_ids: Vec<&str> = lexical_pool
        .iter()
        .chain(vector_pool.iter())
        .map(|(id, _)| id.as_str())
        .collect();
    candidate_ids.sort_unstable();
    candidate_ids.dedup();

    let alpha = params.mode.alpha();

    struct Fused<'a> {
        chunk_id: &'a str,
        lexical_score: f64,
        vector_score: f64,
        score: f64,
    }

    let mut fused: Vec<Fused> = candidate_ids
        .into_iter()
        .map(|id| {
            let l = lexical_norm.get(id).copied().unwrap_or(0.0);
            let v = vector_norm.get(id).copied().unwrap_or(0.0);
            Fused {
                chunk_id: id,
                lexical_score: l,
                vector_score: v,
                score: alpha * v + (1.0 - alpha) * l,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(b.chunk_id))
    });

    let mut results = Vec::with_capacity(params.limit);
    for f in fused {
        if results.len() == params.limit {
            break;
        }
        // A chunk whose document vanished mid-flight would violate the
        // locking discipline; filter it rather than propagate an error.
        let Some(chunk) = chunks.get(f.chunk_id) else {
            tracing::warn!(chunk_id = f.chunk_id, "candidate chunk missing from catalog");
            continue;
        };
        let Some(doc) = docs.get(&chunk.document_id) else {
            tracing::warn!(
                chunk_id = f.chunk_id,
                document_id = %chunk.document_id,
                "candidate chunk references a deleted document"
            );
            continue;
        };
        results.push(RetrievalResult {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            filename: doc.filename.clone(),
            text: chunk.text.clone(),
            lexical_score: f.lexical_score,
            vector_score: f.vector_score,
            score: f.score,
            rank: results.len() + 1,
        });
    }

    Ok(results)
}

/// Min-max normalize a candidate pool to `[0, 1]`. Empty or constant
/// pools normalize to `0.0` for every member.
fn normalize(pool: &[(String, f64)]) -> HashMap<&str, f64> {
    if pool.is_empty() {
        return HashMap::new();
    }

    let min = pool.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = pool
        .iter()
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let spread = max - min;

    pool.iter()
        .map(|(id, s)| {
            let norm = if spread.abs() < f64::EPSILON {
                0.0
            } else {
                (s - min) / spread
            };
            (id.as_str(), norm)
        })
        .collect()
}
