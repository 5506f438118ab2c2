use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use ragline_core::chunk::ChunkingConfig;
use ragline_core::index::lexical::Bm25Params;
use ragline_core::index::vector::DistanceMetric;
use ragline_core::pipeline::PipelineConfig;
use ragline_core::search::SearchMode;
use ragline_core::session::SessionConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingSettings,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8642".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LexicalConfig {
    #[serde(default = "default_k1")]
    pub k1: f64,
    #[serde(default = "default_b")]
    pub b: f64,
    #[serde(default)]
    pub stop_words: bool,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            stop_words: false,
        }
    }
}

fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// `cosine` or `euclidean`.
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dims: default_dims(),
            metric: default_metric(),
        }
    }
}

fn default_dims() -> usize {
    1536
}
fn default_metric() -> String {
    "cosine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Vector share of the hybrid blend: `score = α·vector + (1−α)·lexical`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Result cap for the search endpoints.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Chunks fed into the chat prompt.
    #[serde(default = "default_chat_limit")]
    pub chat_limit: usize,
    /// Candidate pool per side, as a multiple of the limit.
    #[serde(default = "default_pool_factor")]
    pub pool_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            search_limit: default_search_limit(),
            chat_limit: default_chat_limit(),
            pool_factor: default_pool_factor(),
        }
    }
}

fn default_alpha() -> f64 {
    0.5
}
fn default_search_limit() -> usize {
    10
}
fn default_chat_limit() -> usize {
    5
}
fn default_pool_factor() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_prompt_messages")]
    pub prompt_messages: usize,
    #[serde(default = "default_prompt_char_budget")]
    pub prompt_char_budget: usize,
    /// Sessions idle longer than this are expired by a background task.
    /// Absent → sessions never expire.
    #[serde(default)]
    pub idle_ttl_secs: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            prompt_messages: default_prompt_messages(),
            prompt_char_budget: default_prompt_char_budget(),
            idle_ttl_secs: None,
        }
    }
}

fn default_max_messages() -> usize {
    100
}
fn default_prompt_messages() -> usize {
    10
}
fn default_prompt_char_budget() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` (any OpenAI-compatible endpoint) or `disabled`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `openai` (any OpenAI-compatible chat endpoint) or `disabled`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            base_url: default_embedding_base_url(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f64 {
    0.7
}
fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Globs matched when ingesting a directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_max_file_size_mb() -> u64 {
    50
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

impl Config {
    pub fn chunking_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunking.chunk_size,
            overlap: self.chunking.overlap,
        }
    }

    pub fn bm25_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.lexical.k1,
            b: self.lexical.b,
            stop_words: self.lexical.stop_words,
        }
    }

    pub fn distance_metric(&self) -> DistanceMetric {
        match self.vector.metric.as_str() {
            "euclidean" => DistanceMetric::Euclidean,
            _ => DistanceMetric::Cosine,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_messages: self.session.max_messages,
            prompt_messages: self.session.prompt_messages,
            prompt_char_budget: self.session.prompt_char_budget,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            limit: self.retrieval.chat_limit,
            mode: SearchMode::Hybrid {
                alpha: self.retrieval.alpha,
            },
            max_tokens: self.generation.max_tokens,
            ..PipelineConfig::default()
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.ingest.max_file_size_mb * 1024 * 1024
    }
}

/// Load and validate a configuration file. Every field has a default, so
/// a missing file is only an error when explicitly requested.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Validate any configuration, including the built-in defaults.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if !(0.0..=1.0).contains(&config.retrieval.alpha) {
        anyhow::bail!("retrieval.alpha must be in [0.0, 1.0]");
    }
    if config.retrieval.search_limit < 1 || config.retrieval.chat_limit < 1 {
        anyhow::bail!("retrieval limits must be >= 1");
    }
    if config.retrieval.pool_factor < 1 {
        anyhow::bail!("retrieval.pool_factor must be >= 1");
    }

    if config.vector.dims == 0 {
        anyhow::bail!("vector.dims must be > 0");
    }
    match config.vector.metric.as_str() {
        "cosine" | "euclidean" => {}
        other => anyhow::bail!(
            "Unknown vector.metric: '{}'. Must be cosine or euclidean.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.session.max_messages < 2 {
        anyhow::bail!("session.max_messages must be >= 2 to hold one exchange");
    }

    Ok(())
}
