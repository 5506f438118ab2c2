//! Answer pipeline: retrieval → prompt assembly → generation → session
//! update, with source attribution.
//!
//! The pipeline orchestrates the collaborators behind the [`Embedder`]
//! and [`Generator`] traits. It never blocks unboundedly itself — the
//! collaborator implementations own their timeouts and retries and
//! surface [`RagError::EmbeddingUnavailable`] /
//! [`RagError::GenerationUnavailable`] after exhaustion.
//!
//! Session writes are atomic per turn: the user and assistant messages
//! are appended together only after generation succeeds. A failed turn
//! leaves history untouched.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::index::DocumentIndex;
use crate::models::{Answer, Message, RetrievalResult, Role, SourceAttribution};
use crate::search::{retrieve, RetrievalParams, SearchMode};
use crate::session::SessionStore;

/// Maps text to a fixed-size float vector. Implementations are expected
/// to bound their own latency (timeout + bounded retry) and fail with
/// [`RagError::EmbeddingUnavailable`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    /// Vector dimensionality produced by this embedder.
    fn dims(&self) -> usize;
}

/// Maps a prompt to generated text. Same latency contract as
/// [`Embedder`], failing with [`RagError::GenerationUnavailable`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Pipeline-wide defaults, overridable per request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retrieved chunks fed into the prompt.
    pub limit: usize,
    /// Default search mode for chat turns.
    pub mode: SearchMode,
    /// Token budget for the generated answer.
    pub max_tokens: u32,
    /// Characters of chunk text kept in source previews.
    pub preview_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            mode: SearchMode::Hybrid { alpha: 0.5 },
            max_tokens: 1000,
            preview_chars: 200,
        }
    }
}

/// One chat turn request.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub query: String,
    /// Absent → a fresh session id is minted.
    pub session_id: Option<String>,
    /// `false` → stateless turn: no stored history enters the prompt.
    pub use_history: bool,
    /// Override the configured retrieval limit.
    pub limit: Option<usize>,
    /// Override the configured search mode.
    pub mode: Option<SearchMode>,
}

const SYSTEM_INSTRUCTIONS: &str = "You are an assistant that answers questions \
from the provided context passages. Ground every claim in the passages and cite \
them by their bracketed number, e.g. [1]. If the passages do not contain the \
answer, say so plainly instead of guessing.";

const NO_CONTEXT_INSTRUCTIONS: &str = "No matching context was found in the \
indexed documents for this question. Say that the indexed material does not \
cover it; you may add general knowledge only if clearly labelled as such.";

/// Orchestrates retrieval-augmented chat turns over the shared index and
/// session store.
pub struct AnswerPipeline {
    index: Arc<DocumentIndex>,
    sessions: Arc<SessionStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
}

impl AnswerPipeline {
    pub fn new(
        index: Arc<DocumentIndex>,
        sessions: Arc<SessionStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            index,
            sessions,
            embedder,
            generator,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run one chat turn: retrieve, generate, attribute, record.
    pub async fn answer(&self, req: AnswerRequest) -> Result<Answer> {
        let mode = req.mode.unwrap_or(self.config.mode);
        mode.validate()?;
        let limit = req.limit.unwrap_or(self.config.limit);

        let session_id = req
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let history = if req.use_history {
            self.sessions.history_for_prompt(&session_id)
        } else {
            Vec::new()
        };

        let query_vec = if mode.uses_vector() {
            Some(self.embedder.embed(&req.query).await?)
        } else {
            None
        };

        let params = RetrievalParams::new(limit, mode);
        let results = retrieve(&self.index, &req.query, query_vec.as_deref(), &params)?;
        tracing::debug!(
            query = %req.query,
            session = %session_id,
            retrieved = results.len(),
            "assembled retrieval context"
        );

        let prompt = build_prompt(&history, &results, &req.query);
        let response = self
            .generator
            .complete(&prompt, self.config.max_tokens)
            .await?;

        let sources: Vec<SourceAttribution> = results
            .iter()
            .map(|r| attribution(r, self.config.preview_chars))
            .collect();

        self.sessions.append_exchange(
            &session_id,
            Message::user(&req.query),
            Message::assistant(&response, sources.clone()),
        );

        Ok(Answer {
            response,
            sources,
            session_id,
        })
    }

    /// Summarize a session's conversation. Does not mutate history.
    pub async fn summarize(&self, session_id: &str) -> Result<String> {
        let history = self.sessions.history(session_id, true);
        if history.is_empty() {
            return Err(RagError::session_not_found(session_id));
        }

        let mut transcript = String::new();
        for msg in &history {
            let speaker = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            transcript.push_str(speaker);
            transcript.push_str(": ");
            transcript.push_str(&msg.content);
            transcript.push_str("\n\n");
        }

        let prompt = format!(
            "Summarize the following conversation concisely, covering the main \
             topics discussed and any conclusions reached.\n\n{}",
            transcript
        );
        self.generator.complete(&prompt, 300).await
    }
}

/// Assemble the generation prompt: instructions, prior turns, tagged
/// context passages, and the question.
fn build_prompt(history: &[Message], results: &[RetrievalResult], query: &str) -> String {
    let mut prompt = String::new();

    if results.is_empty() {
        prompt.push_str(NO_CONTEXT_INSTRUCTIONS);
    } else {
        prompt.push_str(SYSTEM_INSTRUCTIONS);
    }
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for msg in history {
            let speaker = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(speaker);
            prompt.push_str(": ");
            prompt.push_str(&msg.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    if !results.is_empty() {
        prompt.push_str("Context passages:\n\n");
        for r in results {
            prompt.push_str(&format!("[{}] {}\n{}\n\n", r.rank, r.filename, r.text));
        }
    }

    prompt.push_str("Question: ");
    prompt.push_str(query);
    prompt.push('\n');
    prompt
}

/// Snapshot a retrieval result into a source attribution.
fn attribution(result: &RetrievalResult, preview_chars: usize) -> SourceAttribution {
    let preview = if result.text.chars().count() > preview_chars {
        let cut: String = result.text.chars().take(preview_chars).collect();
        format!("{}...", cut)
    } else {
        result.text.clone()
    };
    SourceAttribution {
        chunk_id: result.chunk_id.clone(),
        document_id: result.document_id.clone(),
        filename: result.filename.clone(),
        score: result.score,
        preview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::lexical::Bm25Params;
    use crate::index::vector::DistanceMetric;
    use crate::models::{Chunk, Document};
    use crate::session::SessionConfig;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Deterministic two-dimensional embedder: text containing "wind"
    /// maps near [0, 1], everything else near [1, 0].
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("wind") {
                Ok(vec![0.0, 1.0])
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
        fn dims(&self) -> usize {
            2
        }
    }

    /// Records every prompt it sees and returns a canned answer.
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("canned answer".to_string())
        }
    }

    /// Always unavailable.
    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
            Err(RagError::GenerationUnavailable("stub outage".into()))
        }
    }

    fn seeded_index() -> Arc<DocumentIndex> {
        let idx = DocumentIndex::new(2, DistanceMetric::Cosine, Bm25Params::default());
        let chunks = vec![
            Chunk {
                id: "c1".into(),
                document_id: "d1".into(),
                seq: 0,
                text: "General climate overview for the region.".into(),
                start: 0,
                end: 40,
                hash: String::new(),
                embedding: Some(vec![1.0, 0.0]),
            },
            Chunk {
                id: "c2".into(),
                document_id: "d1".into(),
                seq: 1,
                text: "The zephyr wind pattern dominates spring.".into(),
                start: 40,
                end: 81,
                hash: String::new(),
                embedding: Some(vec![0.0, 1.0]),
            },
        ];
        idx.insert_document(
            Document {
                id: "d1".into(),
                filename: "climate.txt".into(),
                text: String::new(),
                metadata: serde_json::json!({}),
                ingested_at: Utc::now(),
            },
            chunks,
            false,
        )
        .unwrap();
        Arc::new(idx)
    }

    fn pipeline_with(
        generator: Arc<dyn Generator>,
    ) -> (AnswerPipeline, Arc<SessionStore>, Arc<DocumentIndex>) {
        let index = seeded_index();
        let sessions = Arc::new(SessionStore::new(SessionConfig::default()));
        let pipeline = AnswerPipeline::new(
            index.clone(),
            sessions.clone(),
            Arc::new(StubEmbedder),
            generator,
            PipelineConfig::default(),
        );
        (pipeline, sessions, index)
    }

    fn request(query: &str, session_id: Option<&str>, use_history: bool) -> AnswerRequest {
        AnswerRequest {
            query: query.to_string(),
            session_id: session_id.map(|s| s.to_string()),
            use_history,
            limit: None,
            mode: None,
        }
    }

    #[tokio::test]
    async fn test_answer_records_exchange_with_sources() {
        let generator = Arc::new(RecordingGenerator::new());
        let (pipeline, sessions, _) = pipeline_with(generator.clone());

        let answer = pipeline
            .answer(request("what is the zephyr wind?", None, true))
            .await
            .unwrap();

        assert_eq!(answer.response, "canned answer");
        assert!(!answer.sources.is_empty());
        assert_eq!(answer.sources[0].filename, "climate.txt");

        let history = sessions.history(&answer.session_id, true);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].sources.len(), answer.sources.len());

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Context passages:"));
        assert!(prompts[0].contains("[1]"));
        assert!(prompts[0].contains("Question: what is the zephyr wind?"));
    }

    #[tokio::test]
    async fn test_generation_failure_appends_nothing() {
        let (pipeline, sessions, _) = pipeline_with(Arc::new(FailingGenerator));

        let err = pipeline
            .answer(request("what is the zephyr wind?", Some("s1"), true))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::GenerationUnavailable(_)));
        assert!(sessions.history("s1", true).is_empty());
        assert_eq!(sessions.session_count(), 0);
    }

    #[tokio::test]
    async fn test_no_context_turn_still_generates() {
        let generator = Arc::new(RecordingGenerator::new());
        let index = Arc::new(DocumentIndex::new(
            2,
            DistanceMetric::Cosine,
            Bm25Params::default(),
        ));
        let sessions = Arc::new(SessionStore::default());
        let pipeline = AnswerPipeline::new(
            index,
            sessions,
            Arc::new(StubEmbedder),
            generator.clone(),
            PipelineConfig::default(),
        );

        let answer = pipeline
            .answer(request("anything at all", None, true))
            .await
            .unwrap();
        assert_eq!(answer.response, "canned answer");
        assert!(answer.sources.is_empty());

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("No matching context"));
    }

    #[tokio::test]
    async fn test_stateless_turns_do_not_leak_history() {
        let generator = Arc::new(RecordingGenerator::new());
        let (pipeline, _, _) = pipeline_with(generator.clone());

        pipeline
            .answer(request("first secret question", Some("s1"), false))
            .await
            .unwrap();
        pipeline
            .answer(request("second question", Some("s1"), false))
            .await
            .unwrap();

        let prompts = generator.prompts.lock().unwrap();
        assert!(
            !prompts[1].contains("first secret question"),
            "stateless turn must not carry prior content into the prompt"
        );
    }

    #[tokio::test]
    async fn test_history_threads_into_prompt() {
        let generator = Arc::new(RecordingGenerator::new());
        let (pipeline, _, _) = pipeline_with(generator.clone());

        pipeline
            .answer(request("tell me about the zephyr wind", Some("s1"), true))
            .await
            .unwrap();
        pipeline
            .answer(request("and in winter?", Some("s1"), true))
            .await
            .unwrap();

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[1].contains("Conversation so far:"));
        assert!(prompts[1].contains("tell me about the zephyr wind"));
    }

    #[tokio::test]
    async fn test_lexical_mode_skips_embedding() {
        /// An embedder that panics if called.
        struct ExplodingEmbedder;

        #[async_trait]
        impl Embedder for ExplodingEmbedder {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                panic!("embed must not be called in lexical mode");
            }
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                panic!("embed_batch must not be called in lexical mode");
            }
            fn dims(&self) -> usize {
                2
            }
        }

        let index = seeded_index();
        let sessions = Arc::new(SessionStore::default());
        let pipeline = AnswerPipeline::new(
            index,
            sessions,
            Arc::new(ExplodingEmbedder),
            Arc::new(RecordingGenerator::new()),
            PipelineConfig::default(),
        );

        let mut req = request("zephyr", None, true);
        req.mode = Some(SearchMode::Lexical);
        let answer = pipeline.answer(req).await.unwrap();
        assert!(!answer.sources.is_empty());
    }

    #[test]
    fn test_source_preview_truncation() {
        let long_text = "x".repeat(500);
        let result = RetrievalResult {
            chunk_id: "c".into(),
            document_id: "d".into(),
            filename: "f.txt".into(),
            text: long_text,
            lexical_score: 0.0,
            vector_score: 0.0,
            score: 0.0,
            rank: 1,
        };
        let attr = attribution(&result, 200);
        assert_eq!(attr.preview.chars().count(), 203);
        assert!(attr.preview.ends_with("..."));
    }

    #[tokio::test]
    async fn test_summarize_unknown_session_is_not_found() {
        let (pipeline, _, _) = pipeline_with(Arc::new(RecordingGenerator::new()));
        assert!(matches!(
            pipeline.summarize("missing").await,
            Err(RagError::NotFound { .. })
        ));
    }
}
