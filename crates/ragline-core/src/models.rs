//! Core data models for documents, chunks, retrieval results, and chat
//! sessions.
//!
//! These types flow through the ingestion pipeline (document → chunks →
//! indexes) and the chat pipeline (query → retrieval → answer → session
//! history). Retrieval results are ephemeral; messages keep a snapshot of
//! their source attributions even after the underlying document is deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ingested document. Owned by the ingestion boundary; chunks hold a
/// back-reference to `id` but never own the document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Unique, immutable identifier.
    pub id: String,
    /// Original filename as uploaded.
    pub filename: String,
    /// Full extracted text.
    pub text: String,
    /// Arbitrary caller-supplied metadata.
    pub metadata: serde_json::Value,
    /// When the document was ingested.
    pub ingested_at: DateTime<Utc>,
}

/// A bounded segment of a document's text — the unit of indexing and
/// retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Chunk identifier.
    pub id: String,
    /// Owning document identifier (back-reference, not ownership).
    pub document_id: String,
    /// Position within the document: `0, 1, 2, …`.
    pub seq: i64,
    /// Exact text slice from the source document.
    pub text: String,
    /// Byte offset of the slice start in the source text.
    pub start: usize,
    /// Byte offset one past the slice end.
    pub end: usize,
    /// SHA-256 of the chunk text, hex-encoded.
    pub hash: String,
    /// Embedding vector, set once after the embedding call and immutable
    /// thereafter. `None` when embeddings are disabled.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A ranked chunk produced by one retrieval invocation. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    /// Chunk text, for display and prompt assembly.
    pub text: String,
    /// Min-max-normalized lexical score over the candidate pool.
    pub lexical_score: f64,
    /// Min-max-normalized vector score over the candidate pool.
    pub vector_score: f64,
    /// Fused score: `alpha · vector + (1 − alpha) · lexical`.
    pub score: f64,
    /// 1-based position in the final ordering.
    pub rank: usize,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A link from a generated answer back to a retrieved chunk. The preview
/// and score are snapshots taken at answer time: deleting the document
/// later does not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub score: f64,
    /// First N characters of the chunk text.
    pub preview: String,
}

/// Caller feedback attached to a stored message after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Rating from 1 to 5.
    pub rating: u8,
    pub comment: Option<String>,
}

/// One turn in a chat session.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Sources supporting an assistant message; empty for user messages.
    pub sources: Vec<SourceAttribution>,
    pub timestamp: DateTime<Utc>,
    pub feedback: Option<Feedback>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
            feedback: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceAttribution>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
            feedback: None,
        }
    }
}

/// The outcome of one chat turn: the generated response, the sources
/// that supported it, and the (possibly freshly minted) session id.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SourceAttribution>,
    pub session_id: String,
}

/// Lightweight per-session overview returned by the session listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Corpus statistics reported by the document lifecycle boundary.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub documents: Vec<DocumentStats>,
}

/// Per-document breakdown within [`IndexStats`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub id: String,
    pub filename: String,
    pub chunk_count: usize,
    pub characters: usize,
}
