//! Page-preserving text extraction for PDF documents.
//!
//! The document is first opened with `lopdf` to reject unparseable or
//! encrypted input with a precise [`ExtractionError`], then `pdf-extract`
//! renders each page to plain UTF-8. Pages without a text layer (scanned
//! images) come back as empty strings so the rest of the document can
//! still be ingested.

use crate::error::ExtractionError;
use crate::models::{Document, ExtractedDocument, PageText};

/// Extract every page of `document` as normalized plain text.
pub fn extract_pages(document: &Document) -> Result<ExtractedDocument, ExtractionError> {
    let texts = extract_page_texts(&document.bytes)?;
    let pages = texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            number: i as u32 + 1,
            text: normalize_page_text(&text),
        })
        .collect();

    Ok(ExtractedDocument {
        document_id: document.id.clone(),
        filename: document.filename.clone(),
        pages,
    })
}

fn extract_page_texts(bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractionError::Malformed(
            "missing %PDF header".to_string(),
        ));
    }

    let parsed =
        lopdf::Document::load_mem(bytes).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    if parsed.is_encrypted() {
        return Err(ExtractionError::Encrypted);
    }
    if parsed.get_pages().is_empty() {
        return Err(ExtractionError::Malformed("document has no pages".to_string()));
    }

    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Backend(e.to_string()))
}

/// Strip trailing whitespace per line, collapse runs of blank lines, trim.
fn normalize_page_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
