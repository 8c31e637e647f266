//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`HashEmbedder`]**: offline, deterministic feature hashing; the default.
//! - **[`OpenAiEmbedder`]**: calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Also provides vector utilities used by the index:
//! - [`cosine_similarity`] / [`dot`] / [`l2_norm`]
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` BLOB encoding for SQLite
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the configuration:
//!
//! ```rust
//! # use lexrag::config::EmbeddingConfig;
//! # use lexrag::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "hash"
//! let embedder = create_embedder(&config, 384).unwrap();
//! assert_eq!(embedder.dims(), 384);
//! ```
//!
//! # Errors
//!
//! Providers make a single attempt per call; timeouts and retries are
//! applied by the caller through [`crate::retry::with_retry`]. HTTP
//! status codes are classified as:
//! - 429 (rate limited), 5xx, network errors → [`EmbeddingError::Unavailable`] (transient)
//! - other 4xx → [`EmbeddingError::Rejected`] (permanent)

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// A text embedding backend producing vectors of a fixed dimension.
///
/// Implementations must be deterministic for a given model version and
/// must return `embed_many` results in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Fails with [`EmbeddingError::EmptyInput`]
    /// if any text is blank.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::BatchMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Reject batches containing blank text before they reach a backend.
pub(crate) fn ensure_non_empty(texts: &[String]) -> Result<(), EmbeddingError> {
    if texts.iter().any(|t| t.trim().is_empty()) {
        return Err(EmbeddingError::EmptyInput);
    }
    Ok(())
}

/// Map an HTTP status to the transient/permanent split used for retries.
pub(crate) fn classify_status(
    backend: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> EmbeddingError {
    let msg = format!("{} API error {}: {}", backend, status, body);
    if status.as_u16() == 429 || status.is_server_error() {
        EmbeddingError::Unavailable(msg)
    } else {
        EmbeddingError::Rejected(msg)
    }
}

/// Create the [`Embedder`] named by `config.provider`.
///
/// `dims` is the resolved vector dimension (see
/// [`Config::vector_dims`](crate::config::Config::vector_dims)).
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig, dims: usize) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbedder::new(dims))),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config, dims)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config, dims)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Inner product. Returns `0.0` for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors, vectors of
/// different lengths, or zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}

/// Cosine similarity with precomputed norms, clamped to `[-1.0, 1.0]`.
pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use lexrag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
