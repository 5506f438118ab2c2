//! End-to-end engine tests with deterministic collaborator stubs.
//!
//! Covers the full flow in-process: ingest → chunk → embed → index →
//! search/chat → delete, without any network calls.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ragline::config::Config;
use ragline::engine::{IngestRequest, RagEngine};
use ragline_core::error::RagError;
use ragline_core::pipeline::{AnswerRequest, Embedder, Generator};
use ragline_core::search::SearchMode;

/// Two-dimensional rule-based embedder: text mentioning "alphaterm" maps
/// to [1, 0], everything else to [0, 1].
struct RuleEmbedder;

#[async_trait]
impl Embedder for RuleEmbedder {
    async fn embed(&self, text: &str) -> ragline_core::Result<Vec<f32>> {
        if text.contains("alphaterm") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
    async fn embed_batch(&self, texts: &[String]) -> ragline_core::Result<Vec<Vec<f32>>> {
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

/// Records prompts, answers with a fixed string.
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
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> ragline_core::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("stub answer".to_string())
    }
}

struct OutageGenerator;

#[async_trait]
impl Generator for OutageGenerator {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> ragline_core::Result<String> {
        Err(RagError::GenerationUnavailable("stub outage".into()))
    }
}

fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.chunking.chunk_size = 100;
    cfg.chunking.overlap = 0;
    cfg.vector.dims = 2;
    // The stub embedder stands in for the HTTP provider; marking the
    // provider enabled makes the engine attach chunk embeddings.
    cfg.embedding.provider = "openai".to_string();
    cfg
}

fn engine_with(generator: Arc<dyn Generator>) -> RagEngine {
    RagEngine::new(test_config(), Arc::new(RuleEmbedder), generator).unwrap()
}

const THREE_SECTION_DOC: &str = "The first section discusses the alphaterm calibration procedure in detail. \
The second section covers the zephyr wind measurements from spring. \
The third section is an appendix of miscellaneous notes.";

async fn ingest_fixture(engine: &RagEngine) -> String {
    let receipt = engine
        .ingest(IngestRequest::from_bytes(
            "sections.txt",
            THREE_SECTION_DOC.as_bytes().to_vec(),
        ))
        .await
        .unwrap();
    assert_eq!(receipt.chunk_count, 3, "fixture should chunk into 3 parts");
    receipt.document_id
}

#[tokio::test]
async fn test_lexical_search_finds_term_unique_to_chunk_two() {
    let engine = engine_with(Arc::new(RecordingGenerator::new()));
    ingest_fixture(&engine).await;

    let results = engine
        .search("zephyr", None, SearchMode::Lexical)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].rank, 1);
    assert!(results[0].text.contains("zephyr"));
}

#[tokio::test]
async fn test_vector_search_finds_nearest_chunk_one() {
    let engine = engine_with(Arc::new(RecordingGenerator::new()));
    ingest_fixture(&engine).await;

    let results = engine
        .search("alphaterm", None, SearchMode::Vector)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(
        results[0].text.contains("alphaterm"),
        "nearest neighbor should be the first section"
    );

    // alpha = 1 hybrid agrees with the pure vector head.
    let hybrid = engine
        .search("alphaterm", None, SearchMode::Hybrid { alpha: 1.0 })
        .await
        .unwrap();
    assert_eq!(hybrid[0].chunk_id, results[0].chunk_id);
}

#[tokio::test]
async fn test_delete_removes_from_search_and_stats() {
    let engine = engine_with(Arc::new(RecordingGenerator::new()));
    let doc_id = ingest_fixture(&engine).await;

    let before = engine.stats();
    assert_eq!(before.total_documents, 1);
    assert_eq!(before.total_chunks, 3);

    let removed = engine.delete_document(&doc_id).unwrap();
    assert_eq!(removed, 3);

    let after = engine.stats();
    assert_eq!(after.total_documents, 0);
    assert_eq!(after.total_chunks, 0);

    let results = engine
        .search("zephyr", None, SearchMode::Lexical)
        .await
        .unwrap();
    assert!(results.is_empty());

    assert!(matches!(
        engine.delete_document(&doc_id),
        Err(RagError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_id_rejected_unless_replace() {
    let engine = engine_with(Arc::new(RecordingGenerator::new()));

    let mut first = IngestRequest::from_bytes("a.txt", b"The alphaterm notes. More text.".to_vec());
    first.document_id = Some("fixed-id".to_string());
    engine.ingest(first.clone()).await.unwrap();

    let err = engine.ingest(first.clone()).await.unwrap_err();
    assert!(matches!(err, RagError::DuplicateDocument(_)));
    assert_eq!(engine.stats().total_documents, 1);

    first.replace = true;
    first.bytes = b"Replacement body entirely.".to_vec();
    engine.ingest(first).await.unwrap();
    assert_eq!(engine.stats().total_documents, 1);

    let results = engine
        .search("replacement", None, SearchMode::Lexical)
        .await
        .unwrap();
    assert!(!results.is_empty());
    let stale = engine
        .search("alphaterm", None, SearchMode::Lexical)
        .await
        .unwrap();
    assert!(stale.is_empty(), "replaced content must leave the index");
}

#[tokio::test]
async fn test_batch_reports_per_file_results() {
    let engine = engine_with(Arc::new(RecordingGenerator::new()));

    let outcomes = engine
        .ingest_batch(vec![
            IngestRequest::from_bytes("good.txt", b"Perfectly fine text about zephyr winds.".to_vec()),
            IngestRequest::from_bytes("bad.pdf", b"this is not a pdf".to_vec()),
            IngestRequest::from_bytes("weird.xyz", b"unknown extension".to_vec()),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].1.is_ok());
    assert!(matches!(
        outcomes[1].1.as_ref().unwrap_err(),
        RagError::CorruptFile { .. }
    ));
    assert!(matches!(
        outcomes[2].1.as_ref().unwrap_err(),
        RagError::UnsupportedFormat(_)
    ));

    // The good file is indexed despite the bad ones.
    let results = engine
        .search("zephyr", None, SearchMode::Lexical)
        .await
        .unwrap();
    assert!(!results.is_empty());
}

#[tokio::test]
async fn test_file_size_limit_enforced() {
    let mut cfg = test_config();
    cfg.ingest.max_file_size_mb = 0;
    let engine = RagEngine::new(cfg, Arc::new(RuleEmbedder), Arc::new(RecordingGenerator::new()))
        .unwrap();

    let err = engine
        .ingest(IngestRequest::from_bytes("big.txt", b"anything".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_chat_grounds_answer_and_records_session() {
    let generator = Arc::new(RecordingGenerator::new());
    let engine = engine_with(generator.clone());
    ingest_fixture(&engine).await;

    let answer = engine
        .chat(AnswerRequest {
            query: "what do the zephyr measurements show?".to_string(),
            session_id: None,
            use_history: true,
            limit: None,
            mode: None,
        })
        .await
        .unwrap();

    assert_eq!(answer.response, "stub answer");
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.sources[0].filename, "sections.txt");

    let history = engine.sessions().history(&answer.session_id, true);
    assert_eq!(history.len(), 2);

    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("Context passages:"));
    assert!(prompts[0].contains("zephyr"));
}

#[tokio::test]
async fn test_stateless_turns_do_not_leak_between_calls() {
    let generator = Arc::new(RecordingGenerator::new());
    let engine = engine_with(generator.clone());
    ingest_fixture(&engine).await;

    for query in ["first confidential question", "second question"] {
        engine
            .chat(AnswerRequest {
                query: query.to_string(),
                session_id: Some("shared".to_string()),
                use_history: false,
                limit: None,
                mode: None,
            })
            .await
            .unwrap();
    }

    let prompts = generator.prompts.lock().unwrap();
    assert!(
        !prompts[1].contains("first confidential question"),
        "use_history=false must keep prior turns out of the prompt"
    );
}

#[tokio::test]
async fn test_generation_outage_leaves_history_untouched() {
    let engine = engine_with(Arc::new(OutageGenerator));
    ingest_fixture(&engine).await;

    let err = engine
        .chat(AnswerRequest {
            query: "any question".to_string(),
            session_id: Some("s1".to_string()),
            use_history: true,
            limit: None,
            mode: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::GenerationUnavailable(_)));
    assert!(engine.sessions().history("s1", true).is_empty());
}

#[tokio::test]
async fn test_summarize_uses_generator() {
    let generator = Arc::new(RecordingGenerator::new());
    let engine = engine_with(generator.clone());
    ingest_fixture(&engine).await;

    let answer = engine
        .chat(AnswerRequest {
            query: "what is alphaterm?".to_string(),
            session_id: Some("sum".to_string()),
            use_history: true,
            limit: None,
            mode: None,
        })
        .await
        .unwrap();
    assert_eq!(answer.session_id, "sum");

    let summary = engine.summarize("sum").await.unwrap();
    assert_eq!(summary, "stub answer");

    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts.last().unwrap().contains("Summarize"));
    assert!(prompts.last().unwrap().contains("what is alphaterm?"));
}
