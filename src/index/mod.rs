//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations the pipeline
//! needs: upsert, top-k similarity search, and deletion by document.
//! Two backends are provided:
//!
//! | Backend | Type | Persistence |
//! |---------|------|-------------|
//! | `memory` | [`InMemoryIndex`] | process lifetime |
//! | `sqlite` | [`SqliteIndex`] | file on disk, WAL mode |
//!
//! # Contract
//!
//! - An index has one fixed dimension. Every write validates every entry
//!   before anything is stored, and every query vector is validated, so a
//!   mismatch fails with [`IndexError::DimensionMismatch`] and leaves the
//!   index unchanged.
//! - Upsert is keyed by chunk id: re-upserting an id overwrites it.
//! - Search returns at most `k` hits ordered by descending score, ties
//!   broken by ascending chunk id, so results are deterministic.
//! - Cosine scores are clamped to `[-1, 1]`.

mod memory;
mod sqlite;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::{Config, SimilarityMetric};
use crate::embedding::{cosine_with_norms, dot, l2_norm};
use crate::error::IndexError;
use crate::models::{DocumentSummary, IndexEntry, ScoredChunk};

/// Restricts which entries a search considers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Only entries of these documents. Empty means all documents.
    pub document_ids: Vec<String>,
    /// Only entries whose page range covers this page.
    pub page: Option<u32>,
}

impl SearchFilter {
    pub fn documents(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            document_ids: ids.into_iter().map(Into::into).collect(),
            page: None,
        }
    }

    pub fn matches(&self, entry: &IndexEntry) -> bool {
        if !self.document_ids.is_empty() && !self.document_ids.contains(&entry.document_id) {
            return false;
        }
        match self.page {
            Some(page) => entry.covers_page(page),
            None => true,
        }
    }
}

/// Abstract vector storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite entries by chunk id |
/// | [`search`](VectorIndex::search) | Top-k similarity search |
/// | [`delete`](VectorIndex::delete) | Remove every entry of a document |
/// | [`replace_document`](VectorIndex::replace_document) | Delete then upsert one document's entries |
/// | [`document_entries`](VectorIndex::document_entries) | Stored entries of one document |
/// | [`documents`](VectorIndex::documents) | Per-document listing |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The fixed vector dimension of this index.
    fn dims(&self) -> usize;

    fn metric(&self) -> SimilarityMetric;

    /// Insert or overwrite entries. All-or-nothing. Returns the number written.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError>;

    /// The `k` best entries for `query` that pass `filter`.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError>;

    /// Remove every entry of a document. Returns the number removed.
    async fn delete(&self, document_id: &str) -> Result<usize, IndexError>;

    /// Replace a document's entries with `entries`.
    ///
    /// The default runs delete then upsert; backends override it to make
    /// the swap atomic.
    async fn replace_document(
        &self,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<usize, IndexError> {
        check_entries(self.dims(), entries)?;
        self.delete(document_id).await?;
        self.upsert(entries).await
    }

    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>, IndexError>;

    async fn documents(&self) -> Result<Vec<DocumentSummary>, IndexError>;

    async fn len(&self) -> Result<usize, IndexError>;

    async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }
}

/// Open the index backend named in `config.index`.
pub async fn open_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    let dims = config.vector_dims();
    let metric = config.index.metric;
    match config.index.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(dims, metric))),
        "sqlite" => {
            let path = config
                .index
                .path
                .as_ref()
                .context("index.path is required for the sqlite backend")?;
            let index = SqliteIndex::open(path, dims, metric)
                .await
                .with_context(|| format!("Failed to open index at {}", path.display()))?;
            Ok(Arc::new(index))
        }
        other => bail!("Unknown index backend: {}", other),
    }
}

pub(crate) fn check_dims(expected: usize, actual: usize) -> Result<(), IndexError> {
    if expected != actual {
        return Err(IndexError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Validate a whole batch before any of it is written.
pub(crate) fn check_entries(expected: usize, entries: &[IndexEntry]) -> Result<(), IndexError> {
    entries
        .iter()
        .try_for_each(|e| check_dims(expected, e.dims()))
}

/// Query vector and its norm, computed once per search.
pub(crate) struct Query<'a> {
    pub vector: &'a [f32],
    pub norm: f32,
}

impl<'a> Query<'a> {
    pub fn new(vector: &'a [f32]) -> Self {
        Self {
            vector,
            norm: l2_norm(vector),
        }
    }
}

pub(crate) fn score(metric: SimilarityMetric, query: &Query<'_>, entry: &IndexEntry) -> f32 {
    match metric {
        SimilarityMetric::Cosine => cosine_with_norms(
            query.vector,
            query.norm,
            &entry.record.vector,
            entry.record.norm,
        ),
        SimilarityMetric::Dot => dot(query.vector, &entry.record.vector),
    }
}

/// Order hits best-first with chunk-id tie-break, keep the top `k`.
pub(crate) fn rank(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    hits.retain(|h| h.score.is_finite());
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(k);
    hits
}

/// Group entries into the per-document listing, ordered by filename.
pub(crate) fn summarize<'a>(entries: impl Iterator<Item = &'a IndexEntry>) -> Vec<DocumentSummary> {
    let mut by_doc: std::collections::BTreeMap<&str, DocumentSummary> = Default::default();
    for e in entries {
        let summary = by_doc
            .entry(e.document_id.as_str())
            .or_insert_with(|| DocumentSummary {
                document_id: e.document_id.clone(),
                filename: e.filename.clone(),
                chunks: 0,
                pages: 0,
            });
        summary.chunks += 1;
        summary.pages = summary.pages.max(e.page_end);
    }
    let mut out: Vec<DocumentSummary> = by_doc.into_values().collect();
    out.sort_by(|a, b| {
        a.filename
            .cmp(&b.filename)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{EmbeddingRecord, IndexEntry};

    pub fn entry(doc: &str, ordinal: usize, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            record: EmbeddingRecord::new(format!("{}-{:05}", doc, ordinal), vector),
            document_id: doc.to_string(),
            filename: format!("{}.pdf", doc),
            ordinal,
            page_start: ordinal as u32 + 1,
            page_end: ordinal as u32 + 1,
            text: format!("text of {} #{}", doc, ordinal),
            content_hash: format!("hash-{}-{}", doc, ordinal),
            model: "test".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::entry;
    use super::*;

    fn hit(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk::from_entry(&entry(id, 0, vec![1.0]), score)
    }

    #[test]
    fn rank_orders_by_score_then_id() {
        let ranked = rank(
            vec![hit("b", 0.5), hit("c", 0.9), hit("a", 0.5), hit("d", f32::NAN)],
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn rank_truncates_to_k() {
        let ranked = rank(vec![hit("a", 0.1), hit("b", 0.2), hit("c", 0.3)], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].document_id, "c");
    }

    #[test]
    fn filter_by_document_and_page() {
        let e = entry("lease", 2, vec![1.0]);
        assert!(SearchFilter::default().matches(&e));
        assert!(SearchFilter::documents(["lease"]).matches(&e));
        assert!(!SearchFilter::documents(["nda"]).matches(&e));
        let on_page = SearchFilter {
            page: Some(3),
            ..SearchFilter::default()
        };
        assert!(on_page.matches(&e));
        let off_page = SearchFilter {
            page: Some(1),
            ..SearchFilter::default()
        };
        assert!(!off_page.matches(&e));
    }

    #[test]
    fn dot_metric_is_unnormalized() {
        let e = entry("a", 0, vec![2.0, 0.0]);
        let q = [3.0, 0.0];
        let query = Query::new(&q);
        assert!((score(SimilarityMetric::Dot, &query, &e) - 6.0).abs() < 1e-6);
        assert!((score(SimilarityMetric::Cosine, &query, &e) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn summaries_group_by_document() {
        let entries = vec![
            entry("b", 0, vec![1.0]),
            entry("a", 0, vec![1.0]),
            entry("a", 1, vec![1.0]),
        ];
        let summary = summarize(entries.iter());
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].document_id, "a");
        assert_eq!(summary[0].chunks, 2);
        assert_eq!(summary[0].pages, 2);
    }
}
