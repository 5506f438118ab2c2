//! Error taxonomy shared across the retrieval and answer pipeline.
//!
//! Variants map to how callers react: configuration and argument errors
//! are never retried, `*Unavailable` errors are transient and eligible
//! for bounded retry at the collaborator boundary, and `NotFound` is
//! reported as-is.

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, RagError>;

/// All failures surfaced by the core pipeline and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Invalid configuration or request parameter (bad chunk/overlap
    /// sizing, alpha outside `[0, 1]`, unknown search mode). Fatal at
    /// startup or request validation; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The file's format is not one the extractor understands.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file claimed a supported format but could not be parsed,
    /// or contained no extractable text.
    #[error("corrupt file '{filename}': {reason}")]
    CorruptFile { filename: String, reason: String },

    /// A document with this id is already indexed and `replace` was not set.
    #[error("document already ingested: {0} (set replace to overwrite)")]
    DuplicateDocument(String),

    /// The embedding collaborator failed after retry exhaustion.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The generation collaborator failed after retry exhaustion.
    #[error("generation service unavailable: {0}")]
    GenerationUnavailable(String),

    /// A referenced document or session does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An embedding vector did not match the index dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A request field failed validation (feedback rating out of range,
    /// message index out of bounds).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RagError {
    pub fn document_not_found(id: impl Into<String>) -> Self {
        RagError::NotFound {
            kind: "document",
            id: id.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        RagError::NotFound {
            kind: "session",
            id: id.into(),
        }
    }
}
