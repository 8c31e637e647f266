//! Answer synthesis with OpenAI chat completions.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{render_context, AnswerSynthesizer, CitationParser, Synthesis};
use crate::config::SynthesisConfig;
use crate::error::SynthesisError;
use crate::models::ScoredChunk;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Reply the model is told to give when the context lacks the answer.
const INSUFFICIENT_SENTINEL: &str = "INSUFFICIENT_INFORMATION";

const SYSTEM_PROMPT: &str = "You answer questions about legal documents using only the provided context chunks. \
Cite every statement as [^chunk_id] using the Chunk ID shown in the context and never invent references. \
If the context does not answer the question, reply with exactly INSUFFICIENT_INFORMATION.";

pub struct OpenAiSynthesizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    citations: CitationParser,
}

impl OpenAiSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("synthesis.model required for OpenAI provider"))?;
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            citations: CitationParser::new()?,
        })
    }

    fn interpret(&self, answer: &str) -> Synthesis {
        let answer = answer.trim();
        if answer.is_empty() || answer.starts_with(INSUFFICIENT_SENTINEL) {
            return Synthesis::insufficient();
        }
        Synthesis {
            text: answer.to_string(),
            cited_chunk_ids: self.citations.cited_ids(answer),
            sufficient: true,
        }
    }
}

fn build_prompt(question: &str, context_block: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Context:\n");
    prompt.push_str(context_block);
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(question);
    prompt.push_str(
        "\n\nInstructions:\n1. Answer directly in a few sentences, citing chunks as [^chunk_id].\n\
         2. Quote the operative contract language where it matters.\n\
         3. If the context is insufficient, reply INSUFFICIENT_INFORMATION.\n",
    );
    prompt
}

#[async_trait]
impl AnswerSynthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
    ) -> Result<Synthesis, SynthesisError> {
        if chunks.is_empty() {
            return Ok(Synthesis::insufficient());
        }

        let prompt = build_prompt(query, &render_context(chunks));
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let resp = self
            .client
            .post(ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key.trim()))
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Unavailable(format!("OpenAI request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let msg = format!("OpenAI returned {}: {}", status, text);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                SynthesisError::Unavailable(msg)
            } else {
                SynthesisError::Rejected(msg)
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| SynthesisError::Unavailable(format!("failed to parse OpenAI response: {}", e)))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(self.interpret(&answer))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer() -> OpenAiSynthesizer {
        OpenAiSynthesizer {
            client: reqwest::Client::new(),
            api_key: "test".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            max_tokens: 256,
            citations: CitationParser::new().unwrap(),
        }
    }

    #[test]
    fn sentinel_means_insufficient() {
        let s = synthesizer();
        assert_eq!(s.interpret("INSUFFICIENT_INFORMATION"), Synthesis::insufficient());
        assert_eq!(s.interpret("   "), Synthesis::insufficient());
    }

    #[test]
    fn citations_are_parsed_from_reply() {
        let s = synthesizer();
        let out = s.interpret("Notice is 30 days [^lease-00000], in writing [^lease-00001].");
        assert!(out.sufficient);
        assert_eq!(out.cited_chunk_ids, vec!["lease-00000", "lease-00001"]);
    }

    #[test]
    fn prompt_contains_question_and_context() {
        let prompt = build_prompt("What is the notice period?", "Chunk ID: x\n---\n");
        assert!(prompt.contains("Question:\nWhat is the notice period?"));
        assert!(prompt.contains("Chunk ID: x"));
    }
}
