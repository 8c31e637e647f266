//! Offline answer synthesis by sentence extraction.
//!
//! Sentences of the retrieved chunks are scored by how many distinct
//! query content terms they contain. The best `max_sentences` are
//! returned verbatim, each followed by its chunk's citation marker. Terms
//! match on equality or, for words of four or more letters, on a shared
//! prefix (`period` / `periods`).

use async_trait::async_trait;

use super::{AnswerSynthesizer, Synthesis};
use crate::error::SynthesisError;
use crate::models::ScoredChunk;

const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "an", "and", "any", "are", "as", "at", "be", "been", "before",
    "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "how", "if",
    "in", "into", "is", "it", "its", "may", "must", "no", "not", "of", "on", "or", "shall",
    "should", "so", "such", "than", "that", "the", "their", "then", "there", "these", "they",
    "this", "those", "to", "under", "upon", "was", "we", "were", "what", "when", "where", "which",
    "who", "whom", "why", "will", "with", "would", "you", "your",
];

const MIN_PREFIX: usize = 4;

pub struct ExtractiveSynthesizer {
    max_sentences: usize,
}

impl ExtractiveSynthesizer {
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }
}

#[derive(Debug)]
struct Candidate<'a> {
    chunk_id: &'a str,
    sentence: &'a str,
    matched: usize,
    rank: usize,
}

#[async_trait]
impl AnswerSynthesizer for ExtractiveSynthesizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SynthesisError> {
        let terms = content_terms(query);
        if chunks.is_empty() || terms.is_empty() {
            return Ok(Synthesis::insufficient());
        }

        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for chunk in chunks {
            for sentence in sentences(&chunk.text) {
                // Overlapping chunks repeat sentences; keep the better-ranked copy.
                if candidates.iter().any(|c| c.sentence == sentence) {
                    continue;
                }
                let words = content_terms(sentence);
                let matched = terms
                    .iter()
                    .filter(|t| words.iter().any(|w| terms_match(t, w)))
                    .count();
                if matched > 0 {
                    candidates.push(Candidate {
                        chunk_id: &chunk.chunk_id,
                        sentence,
                        matched,
                        rank: candidates.len(),
                    });
                }
            }
        }

        if candidates.is_empty() {
            return Ok(Synthesis::insufficient());
        }

        candidates.sort_by(|a, b| b.matched.cmp(&a.matched).then(a.rank.cmp(&b.rank)));
        candidates.truncate(self.max_sentences);

        let mut cited_chunk_ids: Vec<String> = Vec::new();
        let mut parts = Vec::with_capacity(candidates.len());
        for c in &candidates {
            parts.push(format!("{} [^{}]", c.sentence, c.chunk_id));
            if !cited_chunk_ids.iter().any(|id| id == c.chunk_id) {
                cited_chunk_ids.push(c.chunk_id.to_string());
            }
        }

        Ok(Synthesis {
            text: parts.join(" "),
            cited_chunk_ids,
            sufficient: true,
        })
    }
}

/// Lowercased words that carry meaning: no stop words, and either at
/// least three characters or a number.
fn content_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let word = word.to_lowercase();
        let numeric = word.chars().all(|c| c.is_ascii_digit());
        if (word.chars().count() < 3 && !numeric) || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

fn terms_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.chars().count() >= MIN_PREFIX && long.starts_with(short)
}

/// Split text into trimmed sentences at `.`, `?`, `!` followed by
/// whitespace, and at line breaks.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some(i),
            '.' | '?' | '!' => match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = boundary {
            let s = text[start..end].trim();
            if !s.is_empty() {
                out.push(s);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
