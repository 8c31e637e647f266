//! Core data models used throughout lexrag.
//!
//! These types represent the documents, chunks, index entries, and answers
//! that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for filename-derived document ids.
const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x6c65_7872_6167_4000_8000_646f_6373_0001);

/// An uploaded file before extraction.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Document {
    /// Create a document whose id is derived from its filename, so that
    /// uploading the same filename again targets the same document.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        Self {
            id: document_id_for(&filename),
            filename,
            bytes,
        }
    }

    pub fn with_id(id: impl Into<String>, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            bytes,
        }
    }
}

/// Deterministic document id for a filename (UUID v5).
pub fn document_id_for(filename: &str) -> String {
    Uuid::new_v5(&DOCUMENT_NAMESPACE, filename.as_bytes()).to_string()
}

/// Text of a single PDF page. `number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Output of the extractor: a document's pages in order.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub document_id: String,
    pub filename: String,
    pub pages: Vec<PageText>,
}

impl ExtractedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn has_text(&self) -> bool {
        self.pages.iter().any(|p| !p.text.trim().is_empty())
    }
}

/// A bounded-size segment of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub page_start: u32,
    pub page_end: u32,
    /// Byte offset of the chunk in the document text.
    pub start: usize,
    /// Exclusive end byte offset in the document text.
    pub end: usize,
    /// Bytes shared with the previous chunk.
    pub overlap: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// The vector half of an index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    /// Cached L2 norm of `vector`.
    pub norm: f32,
}

impl EmbeddingRecord {
    pub fn new(chunk_id: impl Into<String>, vector: Vec<f32>) -> Self {
        let norm = crate::embedding::l2_norm(&vector);
        Self {
            chunk_id: chunk_id.into(),
            vector,
            norm,
        }
    }
}

/// An embedding record plus the chunk metadata needed to render a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub record: EmbeddingRecord,
    pub document_id: String,
    pub filename: String,
    pub ordinal: usize,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
    pub content_hash: String,
    pub model: String,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, filename: &str, model: &str, vector: Vec<f32>) -> Self {
        Self {
            record: EmbeddingRecord::new(chunk.id.clone(), vector),
            document_id: chunk.document_id.clone(),
            filename: filename.to_string(),
            ordinal: chunk.ordinal,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            text: chunk.text.clone(),
            content_hash: chunk.hash.clone(),
            model: model.to_string(),
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.record.chunk_id
    }

    pub fn dims(&self) -> usize {
        self.record.vector.len()
    }

    pub fn covers_page(&self, page: u32) -> bool {
        (self.page_start..=self.page_end).contains(&page)
    }
}

/// A chunk returned by a search, with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub ordinal: usize,
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
    pub score: f32,
}

impl ScoredChunk {
    pub fn from_entry(entry: &IndexEntry, score: f32) -> Self {
        Self {
            chunk_id: entry.record.chunk_id.clone(),
            document_id: entry.document_id.clone(),
            filename: entry.filename.clone(),
            ordinal: entry.ordinal,
            page_start: entry.page_start,
            page_end: entry.page_end,
            text: entry.text.clone(),
            score,
        }
    }
}

/// Ordered search hits, best first, never longer than the requested k.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.hits.iter().any(|h| h.chunk_id == chunk_id)
    }
}

/// Per-chunk retrieval score reported alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkScore {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub page_start: u32,
    pub page_end: u32,
    pub score: f32,
}

impl From<&ScoredChunk> for ChunkScore {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            chunk_id: hit.chunk_id.clone(),
            document_id: hit.document_id.clone(),
            filename: hit.filename.clone(),
            page_start: hit.page_start,
            page_end: hit.page_end,
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Prose synthesized from, and citing, retrieved chunks.
    Grounded,
    /// Nothing retrieved (or nothing relevant) to ground an answer on.
    InsufficientInformation,
    /// Retrieval succeeded but synthesis failed; citations only.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer_text: String,
    pub cited_chunk_ids: Vec<String>,
    pub retrieval_scores: Vec<ChunkScore>,
    pub status: AnswerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// A chunk that could not be embedded or stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub document_id: String,
    pub error: String,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub filename: String,
    pub pages: usize,
    pub chunks_total: usize,
    pub chunks_indexed: usize,
    pub chunks_reused: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn failed(document_id: &str, filename: &str, error: impl ToString) -> Self {
        Self {
            document_id: document_id.to_string(),
            filename: filename.to_string(),
            pages: 0,
            chunks_total: 0,
            chunks_indexed: 0,
            chunks_reused: 0,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Documents that were extracted and chunked (possibly with failed chunks).
    pub documents_processed: usize,
    pub chunks_indexed: usize,
    pub chunks_reused: usize,
    pub failed_chunk_ids: Vec<String>,
    pub chunk_failures: Vec<ChunkFailure>,
    pub documents: Vec<DocumentOutcome>,
    pub cancelled: bool,
}

impl IngestReport {
    pub fn failed_documents(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.is_failure())
    }

    pub fn outcome_for(&self, filename: &str) -> Option<&DocumentOutcome> {
        self.documents.iter().find(|d| d.filename == filename)
    }
}

/// One row of the indexed-documents listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub filename: String,
    pub chunks: usize,
    /// Highest page number covered by any chunk.
    pub pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_stable_per_filename() {
        let a = Document::new("lease.pdf", vec![1, 2, 3]);
        let b = Document::new("lease.pdf", vec![9]);
        let c = Document::new("nda.pdf", vec![1, 2, 3]);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.id, document_id_for("lease.pdf"));
    }

    #[test]
    fn whitespace_pages_have_no_text() {
        let page = |text: &str| PageText {
            number: 1,
            text: text.to_string(),
        };
        let mut doc = ExtractedDocument {
            document_id: document_id_for("scan.pdf"),
            filename: "scan.pdf".to_string(),
            pages: vec![page(""), page("  \n ")],
        };
        assert!(!doc.has_text());
        doc.pages.push(page("Signed."));
        assert!(doc.has_text());
    }

    #[test]
    fn embedding_record_caches_norm() {
        let r = EmbeddingRecord::new("c1", vec![3.0, 4.0]);
        assert!((r.norm - 5.0).abs() < 1e-6);
    }

    #[test]
    fn answer_status_serializes_snake_case() {
        let json = serde_json::to_string(&AnswerStatus::InsufficientInformation).unwrap();
        assert_eq!(json, "\"insufficient_information\"");
    }
}
