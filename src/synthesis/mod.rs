//! Answer synthesis from retrieved chunks.
//!
//! An [`AnswerSynthesizer`] turns a query and its retrieved chunks into
//! answer prose plus the ids of the chunks that prose relies on. Given no
//! chunks, every implementation must return [`Synthesis::insufficient`]
//! instead of generating text.
//!
//! | Config Value | Synthesizer |
//! |-------------|-------------|
//! | `"extractive"` | [`ExtractiveSynthesizer`] (offline, default) |
//! | `"openai"` | [`OpenAiSynthesizer`] (chat completions) |
//!
//! Citations in generated text use footnote markers: `[^chunk_id]`.

mod extractive;
mod openai;

pub use extractive::ExtractiveSynthesizer;
pub use openai::OpenAiSynthesizer;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};

use crate::config::SynthesisConfig;
use crate::error::SynthesisError;
use crate::models::ScoredChunk;

/// Answer text used when the retrieved context cannot answer the query.
pub const INSUFFICIENT_INFORMATION: &str =
    "Insufficient information: the indexed documents do not answer this question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub text: String,
    /// Chunk ids the text relies on, in first-cited order.
    pub cited_chunk_ids: Vec<String>,
    /// `false` when the context did not support an answer.
    pub sufficient: bool,
}

impl Synthesis {
    pub fn insufficient() -> Self {
        Self {
            text: INSUFFICIENT_INFORMATION.to_string(),
            cited_chunk_ids: Vec::new(),
            sufficient: false,
        }
    }
}

#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Answer `query` from `chunks` only. `chunks` are ordered best-first.
    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SynthesisError>;
}

/// Create the [`AnswerSynthesizer`] named by `config.provider`.
pub fn create_synthesizer(config: &SynthesisConfig) -> Result<Box<dyn AnswerSynthesizer>> {
    match config.provider.as_str() {
        "extractive" => Ok(Box::new(ExtractiveSynthesizer::new(config.max_sentences))),
        "openai" => Ok(Box::new(OpenAiSynthesizer::new(config)?)),
        other => bail!("Unknown synthesis provider: {}", other),
    }
}

/// Extracts `[^chunk_id]` markers from generated text.
pub struct CitationParser {
    marker: Regex,
}

impl CitationParser {
    pub fn new() -> Result<Self> {
        let marker =
            Regex::new(r"\s*\[\^([^\]\s]+)\]").context("failed to compile citation regex")?;
        Ok(Self { marker })
    }

    /// `text` with every marker whose id fails `keep` removed, along with
    /// the whitespace before it.
    pub fn retain(&self, text: &str, keep: impl Fn(&str) -> bool) -> String {
        self.marker
            .replace_all(text, |cap: &Captures<'_>| {
                if keep(&cap[1]) {
                    cap[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned()
    }

    /// Unique cited ids in first-occurrence order.
    pub fn cited_ids(&self, text: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for cap in self.marker.captures_iter(text) {
            let id = &cap[1];
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }
}

/// Render retrieved chunks as a prompt context block.
pub(crate) fn render_context(chunks: &[ScoredChunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        let pages = if chunk.page_start == chunk.page_end {
            format!("page {}", chunk.page_start)
        } else {
            format!("pages {}-{}", chunk.page_start, chunk.page_end)
        };
        out.push_str(&format!(
            "Chunk ID: {}\nSource: {} ({})\nScore: {:.4}\n{}\n---\n",
            chunk.chunk_id,
            chunk.filename,
            pages,
            chunk.score,
            chunk.text.trim()
        ));
    }
    out
}
