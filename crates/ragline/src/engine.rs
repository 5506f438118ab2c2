//! The in-process engine wiring extraction, chunking, embedding, the
//! shared index, sessions, and the answer pipeline together.
//!
//! This is the document lifecycle and query boundary that both the HTTP
//! server and the CLI drive: `ingest`/`delete`/`stats` on one side,
//! `search`/`chat` on the other. Multi-document ingestion reports a
//! per-file result list rather than failing the whole batch on one bad
//! file.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use ragline_core::chunk::Chunker;
use ragline_core::error::RagError;
use ragline_core::index::DocumentIndex;
use ragline_core::models::{Answer, IndexStats, RetrievalResult};
use ragline_core::pipeline::{AnswerPipeline, AnswerRequest, Embedder, Generator};
use ragline_core::search::{retrieve, RetrievalParams, SearchMode};
use ragline_core::session::SessionStore;

use crate::config::Config;
use crate::extract;

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Explicit MIME type; derived from the filename extension when absent.
    pub mime_type: Option<String>,
    /// Explicit document id; a UUID is minted when absent.
    pub document_id: Option<String>,
    pub metadata: serde_json::Value,
    /// Overwrite an existing document with the same id.
    pub replace: bool,
}

impl IngestRequest {
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
            mime_type: None,
            document_id: None,
            metadata: serde_json::json!({}),
            replace: false,
        }
    }
}

/// What one successful ingestion produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub filename: String,
    pub chunk_count: usize,
}

/// Shared application engine. Cheap to clone via `Arc` in the server.
pub struct RagEngine {
    config: Config,
    index: Arc<DocumentIndex>,
    sessions: Arc<SessionStore>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    pipeline: AnswerPipeline,
}

impl RagEngine {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> anyhow::Result<Self> {
        crate::config::validate(&config)?;
        if config.embedding.is_enabled() && embedder.dims() != config.vector.dims {
            anyhow::bail!(
                "embedder produces {}-dimensional vectors but vector.dims is {}",
                embedder.dims(),
                config.vector.dims
            );
        }
        let chunker = Chunker::new(config.chunking_config())?;
        let index = Arc::new(DocumentIndex::new(
            config.vector.dims,
            config.distance_metric(),
            config.bm25_params(),
        ));
        let sessions = Arc::new(SessionStore::new(config.session_config()));
        let pipeline = AnswerPipeline::new(
            index.clone(),
            sessions.clone(),
            embedder.clone(),
            generator,
            config.pipeline_config(),
        );
        Ok(Self {
            config,
            index,
            sessions,
            chunker,
            embedder,
            pipeline,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Extract, chunk, embed, and index one document.
    pub async fn ingest(&self, req: IngestRequest) -> ragline_core::Result<IngestReceipt> {
        if req.bytes.len() as u64 > self.config.max_file_size_bytes() {
            return Err(RagError::InvalidArgument(format!(
                "file '{}' exceeds the {} MB limit",
                req.filename, self.config.ingest.max_file_size_mb
            )));
        }

        let mime = match &req.mime_type {
            Some(m) => m.clone(),
            None => extract::mime_for_filename(&req.filename)
                .ok_or_else(|| RagError::UnsupportedFormat(req.filename.clone()))?
                .to_string(),
        };

        let text = extract::extract_text(&req.bytes, &mime, &req.filename)?;
        if text.trim().is_empty() {
            return Err(RagError::CorruptFile {
                filename: req.filename.clone(),
                reason: "no text content found".into(),
            });
        }

        let document_id = req
            .document_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut chunks = self.chunker.split(&document_id, &text);

        if self.config.embedding.is_enabled() {
            for batch in chunks.chunks_mut(self.config.embedding.batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let vectors = self.embedder.embed_batch(&texts).await?;
                for (chunk, vector) in batch.iter_mut().zip(vectors) {
                    chunk.embedding = Some(vector);
                }
            }
        } else {
            tracing::debug!(
                filename = %req.filename,
                "embedding provider disabled; indexing lexically only"
            );
        }

        let chunk_count = self.index.insert_document(
            ragline_core::models::Document {
                id: document_id.clone(),
                filename: req.filename.clone(),
                text,
                metadata: req.metadata,
                ingested_at: Utc::now(),
            },
            chunks,
            req.replace,
        )?;

        tracing::info!(
            filename = %req.filename,
            document_id = %document_id,
            chunks = chunk_count,
            "document ingested"
        );

        Ok(IngestReceipt {
            document_id,
            filename: req.filename,
            chunk_count,
        })
    }

    /// Ingest many documents; one bad file never aborts the rest.
    pub async fn ingest_batch(
        &self,
        requests: Vec<IngestRequest>,
    ) -> Vec<(String, ragline_core::Result<IngestReceipt>)> {
        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            let filename = req.filename.clone();
            let outcome = self.ingest(req).await;
            if let Err(e) = &outcome {
                tracing::warn!(filename = %filename, error = %e, "ingestion failed");
            }
            results.push((filename, outcome));
        }
        results
    }

    /// Remove a document and all its chunks from both indexes.
    pub fn delete_document(&self, document_id: &str) -> ragline_core::Result<usize> {
        let removed = self.index.remove_document(document_id)?;
        tracing::info!(document_id, chunks = removed, "document deleted");
        Ok(removed)
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Run one search. Embeds the query only when the mode needs it.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        mode: SearchMode,
    ) -> ragline_core::Result<Vec<RetrievalResult>> {
        mode.validate()?;
        let limit = limit.unwrap_or(self.config.retrieval.search_limit);

        let query_vec = if mode.uses_vector() {
            Some(self.embedder.embed(query).await?)
        } else {
            None
        };

        let params = RetrievalParams {
            limit,
            pool_size: limit
                .saturating_mul(self.config.retrieval.pool_factor)
                .max(limit),
            mode,
        };
        retrieve(&self.index, query, query_vec.as_deref(), &params)
    }

    /// Run one retrieval-augmented chat turn. Without an embedding
    /// provider, turns that do not name a mode fall back to lexical
    /// retrieval instead of failing.
    pub async fn chat(&self, mut req: AnswerRequest) -> ragline_core::Result<Answer> {
        if req.mode.is_none() && !self.config.embedding.is_enabled() {
            req.mode = Some(SearchMode::Lexical);
        }
        self.pipeline.answer(req).await
    }

    /// Summarize a session's conversation.
    pub async fn summarize(&self, session_id: &str) -> ragline_core::Result<String> {
        self.pipeline.summarize(session_id).await
    }

    /// Default alpha for hybrid searches, from configuration.
    pub fn default_alpha(&self) -> f64 {
        self.config.retrieval.alpha
    }
}
