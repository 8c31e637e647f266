//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lexrag::config::{Config, SimilarityMetric};
use lexrag::embedding::HashEmbedder;
use lexrag::index::InMemoryIndex;
use lexrag::pipeline::Pipeline;
use lexrag::synthesis::ExtractiveSynthesizer;

pub const DIMS: usize = 384;

/// A PDF with one page per entry of `pages`. Lines within a page are
/// separated by `\n`. Builds body then xref with correct byte offsets so
/// both lopdf and pdf-extract can parse it.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    // 1: catalog, 2: pages, 3: font, then (page, contents) pairs.
    let page_obj = |i: usize| 4 + 2 * i;
    let content_obj = |i: usize| 5 + 2 * i;
    let total_objects = 3 + 2 * n;

    let mut out = Vec::new();
    let mut offsets = Vec::with_capacity(total_objects);
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    offsets.push(out.len());
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", page_obj(i))).collect();
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            n
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj(i),
                content_obj(i)
            )
            .as_bytes(),
        );

        let stream = content_stream(text);
        offsets.push(out.len());
        out.extend_from_slice(
            format!("{} 0 obj << /Length {} >> stream\n", content_obj(i), stream.len()).as_bytes(),
        );
        out.extend_from_slice(stream.as_bytes());
        out.extend_from_slice(b"\nendstream endobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total_objects + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn content_stream(text: &str) -> String {
    let mut stream = String::from("BT /F1 12 Tf 72 720 Td");
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            stream.push_str(" 0 -16 Td");
        }
        stream.push_str(&format!(" ({}) Tj", escape(line)));
    }
    stream.push_str(" ET");
    stream
}

fn escape(line: &str) -> String {
    line.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// The two-page notice agreement used across scenarios.
pub fn notice_agreement() -> Vec<u8> {
    pdf_with_pages(&[
        "Section 1: Notice periods are 30 days.",
        "Section 2: Termination requires written notice.",
    ])
}

/// Small chunks, fast retries: fit for one- and two-page fixtures.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.chunking.chunk_size = 50;
    config.chunking.overlap_fraction = 0.2;
    config.pipeline.retry_count = 1;
    config.pipeline.retry_backoff_ms = 1;
    config.pipeline.request_timeout_ms = 5_000;
    config
}

/// Offline pipeline: hash embedder, in-memory index, extractive synthesis.
pub fn offline_pipeline(config: Config) -> Pipeline {
    Pipeline::new(
        config,
        Arc::new(HashEmbedder::new(DIMS)),
        Arc::new(InMemoryIndex::new(DIMS, SimilarityMetric::Cosine)),
        Arc::new(ExtractiveSynthesizer::new(3)),
    )
    .unwrap()
}
