//! Error taxonomy for the ingestion and answering pipeline.
//!
//! Each pipeline component reports failures through its own enum so the
//! orchestrator can decide what to retry, what to isolate per document or
//! chunk, and what to surface to the caller:
//!
//! | Error | Raised by | Policy |
//! |-------|-----------|--------|
//! | [`ExtractionError`] | [`extract`](crate::extract) | recorded per document, batch continues |
//! | [`EmbeddingError`] | [`embedding`](crate::embedding) | transient variants retried, then recorded per chunk |
//! | [`IndexError::Unavailable`] | [`index`](crate::index) | retried with backoff, then fatal for the current call |
//! | [`IndexError::DimensionMismatch`] | [`index`](crate::index) | fatal, never retried |
//! | [`SynthesisError`] | [`synthesis`](crate::synthesis) | retried, then a degraded answer |
//!
//! [`PipelineError`] is what `answer` and `ingest` return to their caller.

use std::time::Duration;

use thiserror::Error;

/// A transient-vs-permanent classification used by [`crate::retry::with_retry`].
pub trait Retryable: Sized {
    /// Whether retrying the same call may succeed.
    fn is_transient(&self) -> bool;

    /// The error reported when a call exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("not a parseable PDF: {0}")]
    Malformed(String),

    #[error("PDF is encrypted and no password was supplied")]
    Encrypted,

    #[error("text extraction failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding backend rejected the request: {0}")]
    Rejected(String),

    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    BatchMismatch { expected: usize, actual: usize },
}

impl Retryable for EmbeddingError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout(after)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Retryable for IndexError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Unavailable(format!("timed out after {:?}", after))
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("answer synthesis backend unavailable: {0}")]
    Unavailable(String),

    #[error("answer synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error("answer synthesis backend rejected the request: {0}")]
    Rejected(String),
}

impl Retryable for SynthesisError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout(after)
    }
}

/// Errors surfaced by the [`Pipeline`](crate::pipeline::Pipeline) to its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid citation pattern: {0}")]
    Citations(String),
}

impl PipelineError {
    /// Configuration drift between embedder and index. Never retried.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(
            self,
            PipelineError::Index(IndexError::DimensionMismatch { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(EmbeddingError::Unavailable("503".into()).is_transient());
        assert!(EmbeddingError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(!EmbeddingError::EmptyInput.is_transient());
        assert!(!EmbeddingError::Rejected("400".into()).is_transient());

        assert!(IndexError::Unavailable("locked".into()).is_transient());
        assert!(!IndexError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_transient());

        assert!(SynthesisError::Unavailable("down".into()).is_transient());
        assert!(!SynthesisError::Rejected("bad".into()).is_transient());
    }

    #[test]
    fn index_timeout_is_unavailable() {
        let e = IndexError::timed_out(Duration::from_secs(2));
        assert!(matches!(e, IndexError::Unavailable(_)));
        assert!(e.is_transient());
    }

    #[test]
    fn dimension_mismatch_detected_through_pipeline_error() {
        let e: PipelineError = IndexError::DimensionMismatch {
            expected: 384,
            actual: 1536,
        }
        .into();
        assert!(e.is_dimension_mismatch());
        assert_eq!(
            e.to_string(),
            "dimension mismatch: index expects 384, got 1536"
        );
    }
}
