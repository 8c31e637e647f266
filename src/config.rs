use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Fraction of `chunk_size` shared between consecutive chunks.
    #[serde(default = "default_overlap_fraction")]
    pub overlap_fraction: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap_fraction: default_overlap_fraction(),
        }
    }
}

impl ChunkingConfig {
    /// Overlap in characters, always strictly less than `chunk_size`.
    pub fn overlap_chars(&self) -> usize {
        let raw = (self.chunk_size as f64 * self.overlap_fraction).round() as usize;
        raw.min(self.chunk_size.saturating_sub(1))
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap_fraction() -> f64 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// Embedding model identifier.
    #[serde(default)]
    pub model: Option<String>,
    /// Vector dimension produced by the model.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Base URL for self-hosted providers (Ollama).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Dot,
}

impl SimilarityMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMetric::Cosine => "cosine",
            SimilarityMetric::Dot => "dot",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub metric: SimilarityMetric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            path: None,
            metric: SimilarityMetric::default(),
        }
    }
}

fn default_index_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Upper bound for caller-supplied `k`.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    /// Hits scoring below this are dropped before synthesis.
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_k: default_max_k(),
            min_score: None,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// `"extractive"` or `"openai"`.
    #[serde(default = "default_synthesis_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: default_synthesis_provider(),
            model: None,
            max_sentences: default_max_sentences(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_synthesis_provider() -> String {
    "extractive".to_string()
}
fn default_max_sentences() -> usize {
    3
}
fn default_max_tokens() -> usize {
    512
}
fn default_temperature() -> f32 {
    0.0
}

/// What happens to a document's existing entries when it is ingested again.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReingestPolicy {
    /// Delete the document's entries and upsert the new ones atomically.
    #[default]
    Replace,
    /// Upsert only; entries of chunks that no longer exist are kept.
    Accumulate,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub reingest: ReingestPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            reingest: ReingestPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_concurrency_limit() -> usize {
    4
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    250
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
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Vector dimension the embedder and index must agree on.
    pub fn vector_dims(&self) -> usize {
        self.embedding.dims.unwrap_or(match self.embedding.provider.as_str() {
            "openai" => 1536,
            "ollama" => 768,
            _ => 384,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_fraction) {
            anyhow::bail!("chunking.overlap_fraction must be in [0.0, 1.0)");
        }

        match self.embedding.provider.as_str() {
            "hash" | "openai" | "ollama" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
                other
            ),
        }
        if self.embedding.dims == Some(0) {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.provider != "hash" && self.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                self.embedding.provider
            );
        }

        match self.index.backend.as_str() {
            "memory" => {}
            "sqlite" => {
                if self.index.path.is_none() {
                    anyhow::bail!("index.path is required when index.backend is 'sqlite'");
                }
            }
            other => anyhow::bail!(
                "Unknown index backend: '{}'. Must be memory or sqlite.",
                other
            ),
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.top_k > self.retrieval.max_k {
            anyhow::bail!("retrieval.top_k must be <= retrieval.max_k");
        }

        match self.synthesis.provider.as_str() {
            "extractive" => {}
            "openai" => {
                if self.synthesis.model.is_none() {
                    anyhow::bail!("synthesis.model must be specified when provider is 'openai'");
                }
            }
            other => anyhow::bail!(
                "Unknown synthesis provider: '{}'. Must be extractive or openai.",
                other
            ),
        }
        if self.synthesis.max_sentences == 0 {
            anyhow::bail!("synthesis.max_sentences must be >= 1");
        }

        if self.pipeline.concurrency_limit == 0 {
            anyhow::bail!("pipeline.concurrency_limit must be >= 1");
        }
        if self.pipeline.request_timeout_ms == 0 {
            anyhow::bail!("pipeline.request_timeout_ms must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
