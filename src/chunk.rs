//! Overlapping sliding-window text chunker.
//!
//! Splits a document's page texts into [`Chunk`]s of at most
//! `chunk_size` characters, with consecutive chunks sharing
//! `overlap_chars()` characters so that a clause cut at a boundary still
//! appears whole in at least one chunk.
//!
//! Each chunk carries a deterministic id derived from its document id and
//! ordinal, its byte span in the document text, the page range it covers,
//! and a SHA-256 hash of its text for embedding reuse on re-ingestion.
//!
//! # Algorithm
//!
//! 1. Join non-empty pages with a blank line, recording each page's span.
//! 2. Take a window of `chunk_size` characters starting at `start`.
//! 3. If the window does not reach the end of the text, pull its end back
//!    to the last whitespace in the window's second half (hard split if
//!    there is none).
//! 4. Emit the chunk, then begin the next window `overlap` characters
//!    before the current end, moved forward to the next word start.
//! 5. Stop once a window reaches the end; trailing text is never dropped.
//!
//! # Example
//!
//! ```rust
//! use lexrag::chunk::{chunk_pages, document_text, reassemble};
//! use lexrag::config::ChunkingConfig;
//! use lexrag::models::PageText;
//!
//! let pages = vec![PageText { number: 1, text: "The lessee shall pay rent monthly.".into() }];
//! let config = ChunkingConfig { chunk_size: 16, overlap_fraction: 0.25 };
//! let chunks = chunk_pages("doc-1", &pages, &config);
//! assert!(chunks.len() > 1);
//! assert_eq!(reassemble(&chunks), document_text(&pages));
//! ```

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, PageText};

const PAGE_SEPARATOR: &str = "\n\n";

/// Byte span of one page inside the document text.
#[derive(Debug, Clone, Copy)]
struct PageSpan {
    number: u32,
    start: usize,
    end: usize,
}

/// The document text chunks are cut from: non-empty pages joined by a blank line.
pub fn document_text(pages: &[PageText]) -> String {
    layout(pages).0
}

fn layout(pages: &[PageText]) -> (String, Vec<PageSpan>) {
    let mut text = String::new();
    let mut spans = Vec::new();
    for page in pages.iter().filter(|p| !p.text.is_empty()) {
        if !text.is_empty() {
            text.push_str(PAGE_SEPARATOR);
        }
        let start = text.len();
        text.push_str(&page.text);
        spans.push(PageSpan {
            number: page.number,
            start,
            end: text.len(),
        });
    }
    (text, spans)
}

/// Split a document's pages into overlapping chunks.
///
/// # Guarantees
///
/// - Zero chunks for a document without text; otherwise at least one.
/// - Ordinals are contiguous from 0 and spans are strictly increasing.
/// - Each chunk has at most `chunk_size` characters.
/// - [`reassemble`] over the result equals [`document_text`].
/// - Identical input and configuration give an identical result.
pub fn chunk_pages(document_id: &str, pages: &[PageText], config: &ChunkingConfig) -> Vec<Chunk> {
    let (text, spans) = layout(pages);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = chars.len();
    let size = config.chunk_size.max(1);
    let overlap = config.overlap_chars();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut prev_end = 0usize;

    loop {
        let mut end = (start + size).min(n);
        if end < n {
            end = snap_end(&chars, start, end, size);
        }

        let overlap_bytes = if chunks.is_empty() {
            0
        } else {
            offsets[prev_end].saturating_sub(offsets[start])
        };
        chunks.push(make_chunk(
            document_id,
            chunks.len(),
            &text,
            offsets[start],
            offsets[end],
            overlap_bytes,
            &spans,
        ));

        if end >= n {
            break;
        }
        prev_end = end;
        let next = end.saturating_sub(overlap).max(start + 1);
        start = snap_start(&chars, next, end);
    }

    chunks
}

/// Pull a window end back to just after whitespace, within the window's
/// second half. Falls back to a hard split.
fn snap_end(chars: &[char], start: usize, end: usize, size: usize) -> usize {
    if chars[end].is_whitespace() || chars[end - 1].is_whitespace() {
        return end;
    }
    let floor = (start + size / 2).max(start + 1);
    (floor..end)
        .rev()
        .find(|&i| chars[i - 1].is_whitespace())
        .unwrap_or(end)
}

/// Move a window start forward to the beginning of a word, never past `limit`.
fn snap_start(chars: &[char], start: usize, limit: usize) -> usize {
    if start == 0 || chars[start - 1].is_whitespace() {
        return start;
    }
    (start + 1..limit)
        .find(|&i| chars[i - 1].is_whitespace() && !chars[i].is_whitespace())
        .unwrap_or(start)
}

fn make_chunk(
    document_id: &str,
    ordinal: usize,
    text: &str,
    start: usize,
    end: usize,
    overlap: usize,
    spans: &[PageSpan],
) -> Chunk {
    let body = &text[start..end];
    let (page_start, page_end) = page_range(spans, start, end);

    Chunk {
        id: chunk_id(document_id, ordinal),
        document_id: document_id.to_string(),
        ordinal,
        page_start,
        page_end,
        start,
        end,
        overlap,
        text: body.to_string(),
        hash: hash_text(body),
    }
}

fn page_range(spans: &[PageSpan], start: usize, end: usize) -> (u32, u32) {
    let mut touched = spans.iter().filter(|s| s.start < end && s.end > start);
    match touched.next() {
        Some(first) => {
            let last = touched.last().unwrap_or(first);
            (first.number, last.number)
        }
        None => {
            // Only separator characters: attribute to the page before them.
            let page = spans
                .iter()
                .rev()
                .find(|s| s.end <= start)
                .or_else(|| spans.first())
                .map(|s| s.number)
                .unwrap_or(1);
            (page, page)
        }
    }
}

/// Chunk id for a document ordinal.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{}-{:05}", document_id, ordinal)
}

/// SHA-256 of a chunk's text, hex encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuild the document text from chunks in ordinal order, dropping overlap.
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for chunk in chunks {
        if chunk.end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(chunk.start);
        out.push_str(&chunk.text[skip..]);
        covered = chunk.end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<PageText> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageText {
                number: i as u32 + 1,
                text: t.to_string(),
            })
            .collect()
    }

    fn config(chunk_size: usize, overlap_fraction: f64) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap_fraction,
        }
    }

    const NOTICE: [&str; 2] = [
        "Section 1: Notice periods are 30 days.",
        "Section 2: Termination requires written notice.",
    ];

    #[test]
    fn short_page_yields_one_chunk() {
        let chunks = chunk_pages("doc1", &pages(&["Governing law: Delaware."]), &config(1000, 0.15));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Governing law: Delaware.");
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].overlap, 0);
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 1));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunk_pages("doc1", &pages(&["", ""]), &config(100, 0.1)).is_empty());
        assert!(chunk_pages("doc1", &[], &config(100, 0.1)).is_empty());
    }

    #[test]
    fn two_page_notice_document() {
        let pages = pages(&NOTICE);
        let chunks = chunk_pages("doc1", &pages, &config(50, 0.2));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.contains("30 days"));
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (1, 2));
        assert_eq!(
            chunks[1].text,
            "Section 2: Termination requires written notice."
        );
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (2, 2));
        assert!(chunks[1].overlap > 0);
        for c in &chunks {
            assert!(c.text.chars().count() <= 50);
        }
    }

    #[test]
    fn reassembly_reconstructs_text() {
        let long = (0..40)
            .map(|i| format!("Clause {} binds the parties to obligation number {}.", i, i * 7))
            .collect::<Vec<_>>()
            .join(" ");
        let pages = pages(&[&long, "", "Schedule A follows.", &long]);
        for (size, overlap) in [(50, 0.2), (120, 0.15), (7, 0.5), (1000, 0.0), (33, 0.0)] {
            let chunks = chunk_pages("doc1", &pages, &config(size, overlap));
            assert_eq!(
                reassemble(&chunks),
                document_text(&pages),
                "size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn trailing_text_is_kept() {
        let text = "a".repeat(95) + " tail";
        let chunks = chunk_pages("doc1", &pages(&[&text]), &config(50, 0.0));
        assert!(chunks.last().unwrap().text.ends_with("tail"));
    }

    #[test]
    fn chunks_respect_size_and_ordinals() {
        let text = "word ".repeat(500);
        let chunks = chunk_pages("doc1", &pages(&[&text]), &config(64, 0.2));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
            assert_eq!(c.id, chunk_id("doc1", i));
            assert!(c.text.chars().count() <= 64);
            if i > 0 {
                assert!(c.start > chunks[i - 1].start);
            }
        }
    }

    #[test]
    fn unbroken_text_is_hard_split() {
        let text = "x".repeat(130);
        let chunks = chunk_pages("doc1", &pages(&[&text]), &config(50, 0.0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text.len(), 50);
        assert_eq!(chunks[2].text.len(), 30);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "§ 1 — Überweisung fällig binnen 30 Tagen. ".repeat(20);
        let pages = pages(&[&text]);
        let chunks = chunk_pages("doc1", &pages, &config(17, 0.3));
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), document_text(&pages));
    }

    #[test]
    fn deterministic() {
        let pages = pages(&NOTICE);
        let a = chunk_pages("doc1", &pages, &config(20, 0.2));
        let b = chunk_pages("doc1", &pages, &config(20, 0.2));
        assert_eq!(a, b);
    }

    #[test]
    fn hash_matches_text() {
        let chunks = chunk_pages("doc1", &pages(&NOTICE), &config(50, 0.2));
        for c in &chunks {
            assert_eq!(c.hash, hash_text(&c.text));
        }
        assert_ne!(chunks[0].hash, chunks[1].hash);
    }
}
