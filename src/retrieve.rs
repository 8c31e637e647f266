//! Query-time retrieval: embed the query, search the index.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::index::{SearchFilter, VectorIndex};
use crate::models::RetrievalResult;
use crate::retry::{with_retry, RetryPolicy};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    retry: RetryPolicy,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, retry: RetryPolicy) -> Self {
        Self {
            embedder,
            index,
            retry,
            min_score: None,
        }
    }

    /// Drop hits scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Top-`k` chunks for `query`.
    ///
    /// An empty index or a blank query gives an empty result without
    /// calling the embedder.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<RetrievalResult, PipelineError> {
        if query.trim().is_empty() || k == 0 {
            return Ok(RetrievalResult::default());
        }
        let empty = with_retry(&self.retry, "index.len", || self.index.is_empty()).await?;
        if empty {
            debug!("index is empty, skipping query embedding");
            return Ok(RetrievalResult::default());
        }

        let vector = with_retry(&self.retry, "embed.query", || self.embedder.embed(query)).await?;
        let mut hits = with_retry(&self.retry, "index.search", || {
            self.index.search(&vector, k, filter)
        })
        .await?;

        if let Some(min) = self.min_score {
            hits.retain(|h| h.score >= min);
        }
        debug!(k, hits = hits.len(), "retrieved");
        Ok(RetrievalResult { hits })
    }
}
