//! Pipeline orchestration.
//!
//! [`Pipeline`] owns one embedder, one index and one synthesizer and runs
//! the two top-level flows:
//!
//! ```text
//! ingest:  PDF bytes → extract → chunk → embed (batched) → index
//! answer:  query → embed → index search → synthesize → Answer
//! ```
//!
//! # Failure isolation
//!
//! - A document that cannot be extracted is recorded in the report and the
//!   rest of the batch continues.
//! - A chunk that cannot be embedded is skipped and its id reported.
//!   Transient batch failures (after retries) fail the whole batch's
//!   chunks; a permanently rejected batch is retried chunk by chunk so one
//!   bad chunk does not take its neighbours down.
//! - A document whose id repeats an earlier one in the same batch is
//!   recorded as failed instead of overwriting the first one's entries.
//! - An unavailable index fails the current document only.
//! - A dimension mismatch is configuration drift and aborts the call.
//!
//! At query time an empty index yields an insufficient-information answer,
//! and a failing synthesizer yields a degraded answer that still carries
//! the retrieved citations. Citation markers for chunks that were not
//! retrieved are removed from the answer text.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::chunk_pages;
use crate::config::{Config, ReingestPolicy};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{EmbeddingError, ExtractionError, IndexError, PipelineError, Retryable};
use crate::extract::extract_pages;
use crate::index::{open_index, SearchFilter, VectorIndex};
use crate::models::{
    Answer, AnswerStatus, Chunk, ChunkFailure, ChunkScore, Document, DocumentOutcome,
    DocumentSummary, IndexEntry, IngestReport, RetrievalResult,
};
use crate::retrieve::Retriever;
use crate::retry::{with_retry, RetryPolicy};
use crate::synthesis::{
    create_synthesizer, AnswerSynthesizer, CitationParser, INSUFFICIENT_INFORMATION,
};

/// Outcome error for a document whose id already appeared earlier in the batch.
pub const DUPLICATE_IN_BATCH: &str = "duplicate document id in batch";

/// A query with optional overrides.
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub query: String,
    /// Number of chunks to retrieve; defaults to `retrieval.top_k`.
    pub k: Option<usize>,
    pub filter: SearchFilter,
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

pub struct Pipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    retriever: Retriever,
    retry: RetryPolicy,
    permits: Semaphore,
    citations: CitationParser,
}

impl Pipeline {
    /// Assemble a pipeline from its components.
    ///
    /// Fails with [`IndexError::DimensionMismatch`] if the embedder and
    /// index disagree on vector dimension.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
    ) -> Result<Self, PipelineError> {
        if embedder.dims() != index.dims() {
            return Err(IndexError::DimensionMismatch {
                expected: index.dims(),
                actual: embedder.dims(),
            }
            .into());
        }

        let retry = RetryPolicy::from_config(&config.pipeline);
        let retriever = Retriever::new(embedder.clone(), index.clone(), retry)
            .with_min_score(config.retrieval.min_score);
        let permits = Semaphore::new(config.pipeline.concurrency_limit.max(1));
        let citations =
            CitationParser::new().map_err(|e| PipelineError::Citations(e.to_string()))?;

        Ok(Self {
            config,
            embedder,
            index,
            synthesizer,
            retriever,
            retry,
            permits,
            citations,
        })
    }

    /// Build every component from configuration.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn Embedder> =
            Arc::from(create_embedder(&config.embedding, config.vector_dims())?);
        let index = open_index(&config).await?;
        let synthesizer: Arc<dyn AnswerSynthesizer> =
            Arc::from(create_synthesizer(&config.synthesis)?);
        info!(
            embedder = embedder.model_name(),
            dims = embedder.dims(),
            index = config.index.backend.as_str(),
            synthesizer = synthesizer.name(),
            "pipeline ready"
        );
        Ok(Self::new(config, embedder, index, synthesizer)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    // ============ Ingestion ============

    pub async fn ingest(&self, documents: Vec<Document>) -> Result<IngestReport, PipelineError> {
        self.ingest_with_cancel(documents, &CancellationToken::new())
            .await
    }

    /// Ingest `documents`, stopping early when `cancel` fires.
    ///
    /// Documents run concurrently up to `pipeline.concurrency_limit`. A
    /// document interrupted by cancellation writes nothing, so the index
    /// keeps its previous entries for it.
    pub async fn ingest_with_cancel(
        &self,
        documents: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, PipelineError> {
        let total = documents.len();
        let limit = self.config.pipeline.concurrency_limit.max(1);

        // Chunk ids derive from the document id, so a second document with
        // the same id would overwrite the first one's entries.
        let mut done = Vec::with_capacity(total);
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(total);
        for (i, doc) in documents.into_iter().enumerate() {
            if seen.insert(doc.id.clone()) {
                unique.push((i, doc));
            } else {
                warn!(document = %doc.filename, document_id = %doc.id, "duplicate document id in batch");
                done.push((i, DocumentIngest::failed(&doc.id, &doc.filename, DUPLICATE_IN_BATCH)));
            }
        }

        let mut in_flight = stream::iter(unique)
            .map(|(i, doc)| async move { (i, self.ingest_document(doc, cancel).await) })
            .buffer_unordered(limit);

        while let Some((i, result)) = in_flight.next().await {
            done.push((i, result?));
        }
        done.sort_by_key(|(i, _)| *i);

        let mut report = IngestReport::default();
        for (_, d) in done {
            if d.processed {
                report.documents_processed += 1;
            }
            report.chunks_indexed += d.outcome.chunks_indexed;
            report.chunks_reused += d.outcome.chunks_reused;
            report.cancelled |= d.cancelled;
            report
                .failed_chunk_ids
                .extend(d.failures.iter().map(|f| f.chunk_id.clone()));
            report.chunk_failures.extend(d.failures);
            report.documents.push(d.outcome);
        }
        report.cancelled |= cancel.is_cancelled();

        info!(
            documents = total,
            processed = report.documents_processed,
            chunks_indexed = report.chunks_indexed,
            chunks_reused = report.chunks_reused,
            chunks_failed = report.failed_chunk_ids.len(),
            cancelled = report.cancelled,
            "ingest finished"
        );
        Ok(report)
    }

    async fn ingest_document(
        &self,
        document: Document,
        cancel: &CancellationToken,
    ) -> Result<DocumentIngest, PipelineError> {
        let document_id = document.id.clone();
        let filename = document.filename.clone();
        if cancel.is_cancelled() {
            return Ok(DocumentIngest::cancelled(&document_id, &filename));
        }

        let extracted = match tokio::task::spawn_blocking(move || extract_pages(&document)).await {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => {
                warn!(document = %filename, error = %e, "extraction failed");
                return Ok(DocumentIngest::failed(&document_id, &filename, e));
            }
            Err(join) => {
                let e = ExtractionError::Malformed(format!("extractor aborted: {}", join));
                warn!(document = %filename, error = %e, "extraction failed");
                return Ok(DocumentIngest::failed(&document_id, &filename, e));
            }
        };

        if !extracted.has_text() {
            warn!(
                document = %filename,
                pages = extracted.page_count(),
                "no extractable text"
            );
        }
        let mut chunks = chunk_pages(&document_id, &extracted.pages, &self.config.chunking);
        chunks.retain(|c| !c.text.trim().is_empty());
        debug!(document = %filename, pages = extracted.page_count(), chunks = chunks.len(), "chunked");

        let mut ingest = DocumentIngest {
            outcome: DocumentOutcome {
                document_id,
                filename,
                pages: extracted.page_count(),
                chunks_total: chunks.len(),
                chunks_indexed: 0,
                chunks_reused: 0,
                error: None,
            },
            failures: Vec::new(),
            processed: true,
            cancelled: false,
        };

        match self.index_chunks(&chunks, cancel, &mut ingest).await {
            Ok(()) => {
                info!(
                    document = %ingest.outcome.filename,
                    chunks = ingest.outcome.chunks_total,
                    indexed = ingest.outcome.chunks_indexed,
                    reused = ingest.outcome.chunks_reused,
                    failed = ingest.failures.len(),
                    "ingested document"
                );
                Ok(ingest)
            }
            Err(e @ IndexError::DimensionMismatch { .. }) => Err(e.into()),
            Err(e) => {
                warn!(document = %ingest.outcome.filename, error = %e, "index write failed");
                for chunk in &chunks {
                    if !ingest.failures.iter().any(|f| f.chunk_id == chunk.id) {
                        ingest.fail(chunk, &e);
                    }
                }
                ingest.outcome.chunks_indexed = 0;
                ingest.outcome.chunks_reused = 0;
                ingest.outcome.error = Some(e.to_string());
                Ok(ingest)
            }
        }
    }

    /// Embed what is not reusable and write the document's entries.
    async fn index_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
        ingest: &mut DocumentIngest,
    ) -> Result<(), IndexError> {
        let document_id = ingest.outcome.document_id.clone();
        let filename = ingest.outcome.filename.clone();
        let model = self.embedder.model_name();

        let existing: HashMap<String, IndexEntry> =
            with_retry(&self.retry, "index.document_entries", || {
                self.index.document_entries(&document_id)
            })
            .await?
            .into_iter()
            .map(|e| (e.chunk_id().to_string(), e))
            .collect();

        let mut entries = Vec::with_capacity(chunks.len());
        let mut pending = Vec::new();
        for chunk in chunks {
            match existing.get(&chunk.id) {
                Some(prev)
                    if prev.content_hash == chunk.hash
                        && prev.model == model
                        && prev.dims() == self.index.dims() =>
                {
                    entries.push(IndexEntry::from_chunk(
                        chunk,
                        &filename,
                        model,
                        prev.record.vector.clone(),
                    ));
                    ingest.outcome.chunks_reused += 1;
                }
                _ => pending.push(chunk),
            }
        }

        for batch in pending.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = self.embed_batch(&texts) => Some(r),
            };
            let Some(result) = result else {
                ingest.cancelled = true;
                break;
            };

            match result {
                Ok(vectors) => {
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        entries.push(IndexEntry::from_chunk(chunk, &filename, model, vector));
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(document = %filename, chunks = batch.len(), error = %e, "embedding batch failed");
                    for chunk in batch {
                        ingest.fail(chunk, &e);
                    }
                }
                Err(e) => {
                    debug!(document = %filename, error = %e, "batch rejected, embedding chunks one by one");
                    for chunk in batch {
                        if cancel.is_cancelled() {
                            ingest.cancelled = true;
                            break;
                        }
                        match self.embed_batch(std::slice::from_ref(&chunk.text)).await {
                            Ok(mut vectors) if vectors.len() == 1 => {
                                let vector = vectors.remove(0);
                                entries.push(IndexEntry::from_chunk(chunk, &filename, model, vector));
                            }
                            Ok(vectors) => ingest.fail(
                                chunk,
                                &EmbeddingError::BatchMismatch {
                                    expected: 1,
                                    actual: vectors.len(),
                                },
                            ),
                            Err(e) => {
                                warn!(chunk = %chunk.id, error = %e, "chunk embedding failed");
                                ingest.fail(chunk, &e);
                            }
                        }
                    }
                }
            }
            if ingest.cancelled {
                break;
            }
        }

        if ingest.cancelled {
            ingest.processed = false;
            ingest.outcome.chunks_reused = 0;
            ingest.outcome.error = Some(PipelineError::Cancelled.to_string());
            return Ok(());
        }

        let written = match self.config.pipeline.reingest {
            ReingestPolicy::Replace => {
                with_retry(&self.retry, "index.replace_document", || {
                    self.index.replace_document(&document_id, &entries)
                })
                .await?
            }
            ReingestPolicy::Accumulate => {
                with_retry(&self.retry, "index.upsert", || self.index.upsert(&entries)).await?
            }
        };
        ingest.outcome.chunks_indexed = written;
        Ok(())
    }

    /// One embedding call under a concurrency permit, with timeout and retry.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EmbeddingError::Unavailable("pipeline is shutting down".to_string()))?;
        let vectors = with_retry(&self.retry, "embed.batch", || self.embedder.embed_many(texts)).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::BatchMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }

    // ============ Answering ============

    /// Answer `query` over the whole index.
    pub async fn answer(&self, query: &str, k: Option<usize>) -> Result<Answer, PipelineError> {
        let request = AnswerRequest {
            query: query.to_string(),
            k,
            filter: SearchFilter::default(),
        };
        self.answer_request(request, &CancellationToken::new()).await
    }

    pub async fn answer_request(
        &self,
        request: AnswerRequest,
        cancel: &CancellationToken,
    ) -> Result<Answer, PipelineError> {
        let k = self.clamp_k(request.k);

        let retrieval: RetrievalResult = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            r = self.retriever.retrieve(&request.query, k, &request.filter) => r?,
        };
        let scores: Vec<ChunkScore> = retrieval.hits.iter().map(ChunkScore::from).collect();

        if retrieval.is_empty() {
            debug!(query = %request.query, "nothing retrieved");
            return Ok(insufficient(scores));
        }

        let synthesized = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            r = with_retry(&self.retry, "synthesize", || {
                self.synthesizer.synthesize(&request.query, &retrieval.hits)
            }) => r,
        };

        let answer = match synthesized {
            Ok(s) if !s.sufficient => insufficient(scores),
            Ok(s) => {
                let mut cited: Vec<String> = s
                    .cited_chunk_ids
                    .into_iter()
                    .filter(|id| retrieval.contains(id))
                    .collect();
                if cited.is_empty() {
                    cited = retrieval.hits.iter().map(|h| h.chunk_id.clone()).collect();
                }
                Answer {
                    answer_text: self.citations.retain(&s.text, |id| retrieval.contains(id)),
                    cited_chunk_ids: cited,
                    retrieval_scores: scores,
                    status: AnswerStatus::Grounded,
                    degraded_reason: None,
                }
            }
            Err(e) => {
                warn!(synthesizer = self.synthesizer.name(), error = %e, "synthesis failed, returning citations only");
                Answer {
                    answer_text: String::new(),
                    cited_chunk_ids: retrieval.hits.iter().map(|h| h.chunk_id.clone()).collect(),
                    retrieval_scores: scores,
                    status: AnswerStatus::Degraded,
                    degraded_reason: Some(e.to_string()),
                }
            }
        };
        info!(
            k,
            hits = retrieval.len(),
            cited = answer.cited_chunk_ids.len(),
            status = ?answer.status,
            "answered"
        );
        Ok(answer)
    }

    fn clamp_k(&self, k: Option<usize>) -> usize {
        let max = self.config.retrieval.max_k.max(1);
        k.unwrap_or(self.config.retrieval.top_k).clamp(1, max)
    }

    // ============ Maintenance ============

    /// Remove a document's entries. Returns how many were removed.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize, PipelineError> {
        let removed =
            with_retry(&self.retry, "index.delete", || self.index.delete(document_id)).await?;
        info!(document_id, removed, "deleted document");
        Ok(removed)
    }

    pub async fn documents(&self) -> Result<Vec<DocumentSummary>, PipelineError> {
        Ok(with_retry(&self.retry, "index.documents", || self.index.documents()).await?)
    }
}

fn insufficient(scores: Vec<ChunkScore>) -> Answer {
    Answer {
        answer_text: INSUFFICIENT_INFORMATION.to_string(),
        cited_chunk_ids: Vec::new(),
        retrieval_scores: scores,
        status: AnswerStatus::InsufficientInformation,
        degraded_reason: None,
    }
}

/// Per-document result collected into the [`IngestReport`].
struct DocumentIngest {
    outcome: DocumentOutcome,
    failures: Vec<ChunkFailure>,
    processed: bool,
    cancelled: bool,
}

impl DocumentIngest {
    fn failed(document_id: &str, filename: &str, error: impl ToString) -> Self {
        Self {
            outcome: DocumentOutcome::failed(document_id, filename, error),
            failures: Vec::new(),
            processed: false,
            cancelled: false,
        }
    }

    fn cancelled(document_id: &str, filename: &str) -> Self {
        Self {
            cancelled: true,
            ..Self::failed(document_id, filename, PipelineError::Cancelled)
        }
    }

    fn fail(&mut self, chunk: &Chunk, error: &impl ToString) {
        self.failures.push(ChunkFailure {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimilarityMetric;
    use crate::embedding::HashEmbedder;
    use crate::index::InMemoryIndex;
    use crate::synthesis::ExtractiveSynthesizer;

    fn pipeline(config: Config) -> Pipeline {
        Pipeline::new(
            config,
            Arc::new(HashEmbedder::new(32)),
            Arc::new(InMemoryIndex::new(32, SimilarityMetric::Cosine)),
            Arc::new(ExtractiveSynthesizer::new(3)),
        )
        .unwrap()
    }

    #[test]
    fn k_is_clamped() {
        let mut config = Config::default();
        config.retrieval.top_k = 4;
        config.retrieval.max_k = 10;
        let p = pipeline(config);
        assert_eq!(p.clamp_k(None), 4);
        assert_eq!(p.clamp_k(Some(0)), 1);
        assert_eq!(p.clamp_k(Some(99)), 10);
    }

    #[test]
    fn mismatched_components_are_rejected() {
        let result = Pipeline::new(
            Config::default(),
            Arc::new(HashEmbedder::new(16)),
            Arc::new(InMemoryIndex::new(32, SimilarityMetric::Cosine)),
            Arc::new(ExtractiveSynthesizer::new(3)),
        );
        assert!(matches!(result, Err(e) if e.is_dimension_mismatch()));
    }

    #[tokio::test]
    async fn cancelled_answer_is_an_error() {
        let p = pipeline(Config::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = p
            .answer_request(AnswerRequest::new("notice"), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
    }

    #[tokio::test]
    async fn non_pdf_is_recorded_not_raised() {
        let p = pipeline(Config::default());
        let report = p
            .ingest(vec![Document::new("notes.pdf", b"plain text".to_vec())])
            .await
            .unwrap();
        assert_eq!(report.documents_processed, 0);
        assert_eq!(report.chunks_indexed, 0);
        assert!(report.documents[0].error.is_some());
    }
}
