//! In-memory [`VectorIndex`] for tests and ephemeral sessions.
//!
//! Entries live in a `BTreeMap` keyed by chunk id behind a
//! `std::sync::RwLock`. Search is brute-force over all entries.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{check_dims, check_entries, rank, score, summarize, Query, SearchFilter, VectorIndex};
use crate::config::SimilarityMetric;
use crate::error::IndexError;
use crate::models::{DocumentSummary, IndexEntry, ScoredChunk};

pub struct InMemoryIndex {
    dims: usize,
    metric: SimilarityMetric,
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new(dims: usize, metric: SimilarityMetric) -> Self {
        Self {
            dims,
            metric,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, IndexEntry>>, IndexError> {
        self.entries
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, IndexEntry>>, IndexError> {
        self.entries
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))
    }
}

fn remove_document(map: &mut BTreeMap<String, IndexEntry>, document_id: &str) -> usize {
    let before = map.len();
    map.retain(|_, e| e.document_id != document_id);
    before - map.len()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        check_entries(self.dims, entries)?;
        let mut map = self.write()?;
        for e in entries {
            map.insert(e.chunk_id().to_string(), e.clone());
        }
        Ok(entries.len())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        check_dims(self.dims, query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = Query::new(query);
        let map = self.read()?;
        let hits = map
            .values()
            .filter(|e| filter.matches(e))
            .map(|e| ScoredChunk::from_entry(e, score(self.metric, &query, e)))
            .collect();
        Ok(rank(hits, k))
    }

    async fn delete(&self, document_id: &str) -> Result<usize, IndexError> {
        let mut map = self.write()?;
        Ok(remove_document(&mut map, document_id))
    }

    async fn replace_document(
        &self,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<usize, IndexError> {
        check_entries(self.dims, entries)?;
        let mut map = self.write()?;
        remove_document(&mut map, document_id);
        for e in entries {
            map.insert(e.chunk_id().to_string(), e.clone());
        }
        Ok(entries.len())
    }

    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>, IndexError> {
        let map = self.read()?;
        let mut entries: Vec<IndexEntry> = map
            .values()
            .filter(|e| e.document_id == document_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.ordinal);
        Ok(entries)
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>, IndexError> {
        let map = self.read()?;
        Ok(summarize(map.values()))
    }

    async fn len(&self) -> Result<usize, IndexError> {
        Ok(self.read()?.len())
    }
}
