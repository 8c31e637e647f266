//! SQLite-backed [`VectorIndex`].
//!
//! One row per chunk in `index_entries`, the vector stored as a
//! little-endian `f32` BLOB (see [`vec_to_blob`]). The dimension the file
//! was created with is recorded in `index_meta`; opening it with a
//! different dimension fails with [`IndexError::DimensionMismatch`].
//!
//! Search loads candidate rows and scores them brute-force in Rust.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, warn};

use super::{check_dims, check_entries, rank, score, Query, SearchFilter, VectorIndex};
use crate::config::SimilarityMetric;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::IndexError;
use crate::models::{DocumentSummary, EmbeddingRecord, IndexEntry, ScoredChunk};

pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
    metric: SimilarityMetric,
}

impl SqliteIndex {
    /// Open (creating if missing) the index file at `path`.
    pub async fn open(path: &Path, dims: usize, metric: SimilarityMetric) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let index = Self { pool, dims, metric };
        index.migrate().await?;
        index.check_meta().await?;
        debug!(path = %path.display(), dims, metric = metric.as_str(), "opened sqlite index");
        Ok(index)
    }

    async fn migrate(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_entries (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                page_start INTEGER NOT NULL,
                page_end INTEGER NOT NULL,
                text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                norm REAL NOT NULL,
                embedding BLOB NOT NULL,
                indexed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_index_entries_document ON index_entries(document_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn check_meta(&self) -> Result<(), IndexError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dims'")
                .fetch_optional(&self.pool)
                .await?;

        match stored.map(|v| v.parse::<usize>()) {
            Some(Ok(expected)) => check_dims(expected, self.dims)?,
            Some(Err(_)) => {
                return Err(IndexError::Unavailable(
                    "index_meta.dims is not a number".to_string(),
                ))
            }
            None => {
                sqlx::query("INSERT INTO index_meta (key, value) VALUES ('dims', ?)")
                    .bind(self.dims.to_string())
                    .execute(&self.pool)
                    .await?;
            }
        }

        let stored_metric: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'metric'")
                .fetch_optional(&self.pool)
                .await?;
        if let Some(m) = &stored_metric {
            if m != self.metric.as_str() {
                warn!(stored = %m, configured = self.metric.as_str(), "similarity metric changed");
            }
        }
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES ('metric', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(self.metric.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_all(
        tx: &mut Transaction<'_, Sqlite>,
        entries: &[IndexEntry],
    ) -> Result<(), IndexError> {
        let now = chrono::Utc::now().timestamp();
        for e in entries {
            sqlx::query(
                r#"
                INSERT INTO index_entries (chunk_id, document_id, filename, ordinal,
                                           page_start, page_end, text, content_hash,
                                           model, dims, norm, embedding, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    filename = excluded.filename,
                    ordinal = excluded.ordinal,
                    page_start = excluded.page_start,
                    page_end = excluded.page_end,
                    text = excluded.text,
                    content_hash = excluded.content_hash,
                    model = excluded.model,
                    dims = excluded.dims,
                    norm = excluded.norm,
                    embedding = excluded.embedding,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(e.chunk_id())
            .bind(&e.document_id)
            .bind(&e.filename)
            .bind(e.ordinal as i64)
            .bind(e.page_start as i64)
            .bind(e.page_end as i64)
            .bind(&e.text)
            .bind(&e.content_hash)
            .bind(&e.model)
            .bind(e.dims() as i64)
            .bind(e.record.norm as f64)
            .bind(vec_to_blob(&e.record.vector))
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn load(&self, document_id: Option<&str>) -> Result<Vec<IndexEntry>, IndexError> {
        let rows = match document_id {
            Some(id) => {
                sqlx::query("SELECT * FROM index_entries WHERE document_id = ? ORDER BY ordinal")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM index_entries")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<IndexEntry, IndexError> {
    let blob: Vec<u8> = row.try_get("embedding")?;
    let norm: f64 = row.try_get("norm")?;
    let ordinal: i64 = row.try_get("ordinal")?;
    let page_start: i64 = row.try_get("page_start")?;
    let page_end: i64 = row.try_get("page_end")?;

    Ok(IndexEntry {
        record: EmbeddingRecord {
            chunk_id: row.try_get("chunk_id")?,
            vector: blob_to_vec(&blob),
            norm: norm as f32,
        },
        document_id: row.try_get("document_id")?,
        filename: row.try_get("filename")?,
        ordinal: ordinal as usize,
        page_start: page_start as u32,
        page_end: page_end as u32,
        text: row.try_get("text")?,
        content_hash: row.try_get("content_hash")?,
        model: row.try_get("model")?,
    })
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize, IndexError> {
        check_entries(self.dims, entries)?;
        let mut tx = self.pool.begin().await?;
        Self::insert_all(&mut tx, entries).await?;
        tx.commit().await?;
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
        let candidates = match filter.document_ids.as_slice() {
            [single] => self.load(Some(single)).await?,
            _ => self.load(None).await?,
        };
        let hits = candidates
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| ScoredChunk::from_entry(e, score(self.metric, &query, e)))
            .collect();
        Ok(rank(hits, k))
    }

    async fn delete(&self, document_id: &str) -> Result<usize, IndexError> {
        let result = sqlx::query("DELETE FROM index_entries WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn replace_document(
        &self,
        document_id: &str,
        entries: &[IndexEntry],
    ) -> Result<usize, IndexError> {
        check_entries(self.dims, entries)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_entries WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_all(&mut tx, entries).await?;
        tx.commit().await?;
        Ok(entries.len())
    }

    async fn document_entries(&self, document_id: &str) -> Result<Vec<IndexEntry>, IndexError> {
        self.load(Some(document_id)).await
    }

    async fn documents(&self) -> Result<Vec<DocumentSummary>, IndexError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, MAX(filename) AS filename,
                   COUNT(*) AS chunks, MAX(page_end) AS pages
            FROM index_entries
            GROUP BY document_id
            ORDER BY filename, document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let chunks: i64 = row.try_get("chunks")?;
                let pages: i64 = row.try_get("pages")?;
                Ok(DocumentSummary {
                    document_id: row.try_get("document_id")?,
                    filename: row.try_get("filename")?,
                    chunks: chunks as usize,
                    pages: pages as u32,
                })
            })
            .collect()
    }

    async fn len(&self) -> Result<usize, IndexError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
