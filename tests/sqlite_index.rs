//! SQLite index backend: persistence, atomic replace, and dimension checks.

mod common;

use lexrag::config::{Config, SimilarityMetric};
use lexrag::index::{SearchFilter, SqliteIndex, VectorIndex};
use lexrag::models::{document_id_for, AnswerStatus, Document};
use lexrag::pipeline::Pipeline;
use tempfile::TempDir;

use common::{notice_agreement, test_config};

fn sqlite_config(tmp: &TempDir) -> Config {
    let mut config = test_config();
    config.index.backend = "sqlite".to_string();
    config.index.path = Some(tmp.path().join("data").join("lexrag.sqlite"));
    config
}

#[tokio::test]
async fn entries_survive_reopen() {
    let tmp = TempDir::new().unwrap();

    let first = Pipeline::from_config(sqlite_config(&tmp)).await.unwrap();
    let report = first
        .ingest(vec![Document::new("agreement.pdf", notice_agreement())])
        .await
        .unwrap();
    assert!(report.chunks_indexed >= 2);
    drop(first);

    let reopened = Pipeline::from_config(sqlite_config(&tmp)).await.unwrap();
    assert_eq!(reopened.index().len().await.unwrap(), report.chunks_indexed);

    let documents = reopened.documents().await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].filename, "agreement.pdf");
    assert_eq!(documents[0].document_id, document_id_for("agreement.pdf"));
    assert_eq!(documents[0].chunks, report.chunks_indexed);
    assert_eq!(documents[0].pages, 2);

    let answer = reopened
        .answer("What is the notice period?", None)
        .await
        .unwrap();
    assert_eq!(answer.status, AnswerStatus::Grounded);
    assert!(answer.answer_text.contains("30 days"));
}

#[tokio::test]
async fn reingest_reuses_stored_vectors() {
    let tmp = TempDir::new().unwrap();
    let p = Pipeline::from_config(sqlite_config(&tmp)).await.unwrap();

    let first = p
        .ingest(vec![Document::new("agreement.pdf", notice_agreement())])
        .await
        .unwrap();
    let second = p
        .ingest(vec![Document::new("agreement.pdf", notice_agreement())])
        .await
        .unwrap();

    assert_eq!(second.chunks_reused, first.chunks_indexed);
    assert_eq!(p.index().len().await.unwrap(), first.chunks_indexed);
}

#[tokio::test]
async fn reopening_with_other_dims_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("lexrag.sqlite");

    let index = SqliteIndex::open(&path, 384, SimilarityMetric::Cosine)
        .await
        .unwrap();
    assert_eq!(index.dims(), 384);
    drop(index);

    let err = SqliteIndex::open(&path, 1536, SimilarityMetric::Cosine)
        .await
        .err()
        .unwrap();
    assert_eq!(
        err,
        lexrag::error::IndexError::DimensionMismatch {
            expected: 384,
            actual: 1536
        }
    );
}

#[tokio::test]
async fn delete_and_search_filter_on_disk() {
    let tmp = TempDir::new().unwrap();
    let p = Pipeline::from_config(sqlite_config(&tmp)).await.unwrap();
    p.ingest(vec![
        Document::new("agreement.pdf", notice_agreement()),
        Document::new(
            "nda.pdf",
            common::pdf_with_pages(&["Confidential information stays secret for five years."]),
        ),
    ])
    .await
    .unwrap();

    let nda = document_id_for("nda.pdf");
    let query = vec![1.0f32; common::DIMS];
    let hits = p
        .index()
        .search(&query, 10, &SearchFilter::documents([nda.clone()]))
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.document_id == nda));

    let removed = p.delete_document(&nda).await.unwrap();
    assert_eq!(removed, hits.len());
    assert_eq!(p.documents().await.unwrap().len(), 1);
}
