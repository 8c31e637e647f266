//! Offline embedding by feature hashing.
//!
//! Every word is lowercased, wrapped in boundary markers (`^notice$`) and
//! cut into character trigrams; each trigram increments one of `dims`
//! buckets chosen by SHA-256. The vector is L2-normalized. Trigrams make
//! inflections overlap (`period` / `periods`), which is enough lexical
//! signal for local use and fully reproducible tests.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{ensure_non_empty, Embedder};
use crate::error::EmbeddingError;

const MODEL_NAME: &str = "hash-trigram-v1";

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in words(text) {
            let marked: Vec<char> = std::iter::once('^')
                .chain(word.chars())
                .chain(std::iter::once('$'))
                .collect();
            for gram in marked.windows(3) {
                let gram: String = gram.iter().collect();
                v[self.bucket(&gram)] += 1.0;
            }
        }
        let norm = super::l2_norm(&v);
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }

    fn bucket(&self, gram: &str) -> usize {
        let digest = Sha256::digest(gram.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.dims as u64) as usize
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        ensure_non_empty(texts)?;
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
