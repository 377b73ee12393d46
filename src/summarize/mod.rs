// src/summarize/mod.rs
//! Bounded map-reduce summarization.
//!
//! Short text goes out in one request. Long text is split into overlapping
//! chunks, each chunk is summarized on its own ("map"), and one final request
//! turns the per-chunk summaries into the summary and outline ("reduce").
//! Both the single-pass and the reduce request use the same two-section
//! response format, parsed by [`parse_sections`].

pub mod llm;

use std::sync::Arc;

use metrics::counter;

use crate::config::{LlmConfig, SummarizerConfig};
pub use llm::{ChatModel, DisabledModel, OpenAiCompatible};

pub const SUMMARY_MARKER: &str = "[SUMMARY]";
pub const OUTLINE_MARKER: &str = "[OUTLINE]";

pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable: no language model configured";
pub const OUTLINE_UNAVAILABLE: &str = "Outline unavailable: no language model configured";
pub const SUMMARY_NO_CONTENT: &str = "No content available to summarize";
pub const OUTLINE_NO_CONTENT: &str = "No content available to outline";
pub const OUTLINE_UNSTRUCTURED: &str = "No structured outline could be produced";

const SYSTEM_PROMPT: &str =
    "You are a careful content analyst. You summarize faithfully and keep names and figures intact.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub summary: String,
    pub outline: String,
}

impl Summary {
    fn new(summary: impl Into<String>, outline: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            outline: outline.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(SUMMARY_UNAVAILABLE, OUTLINE_UNAVAILABLE)
    }

    pub fn no_content() -> Self {
        Self::new(SUMMARY_NO_CONTENT, OUTLINE_NO_CONTENT)
    }

    fn failed(err: &anyhow::Error) -> Self {
        Self::new(
            format!("Summary generation failed: {err:#}"),
            format!("Outline generation failed: {err:#}"),
        )
    }
}

/// Split `text` into overlapping chunks on char boundaries.
///
/// Chunks hold `size` chars and start `size - overlap` chars apart, with
/// `overlap` clamped to `size / 2`. After `max_chunks` chunks any remaining
/// tail becomes one last chunk, so the result never drops text and has at
/// most `max_chunks + 1` entries. Every chunk after the first begins with the
/// last `overlap` chars of its predecessor.
pub fn split_into_chunks(text: &str, size: usize, overlap: usize, max_chunks: usize) -> Vec<&str> {
    if text.is_empty() {
        return vec![text];
    }
    let size = size.max(1);
    let overlap = overlap.min(size / 2);
    let max_chunks = max_chunks.max(1);

    // byte offset of every char, plus the end
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < len && chunks.len() < max_chunks {
        let end = (start + size).min(len);
        chunks.push(&text[bounds[start]..bounds[end]]);
        if end >= len {
            return chunks;
        }
        start = end - overlap;
    }
    if start < len {
        chunks.push(&text[bounds[start]..]);
    }
    chunks
}

/// Split a two-section response into summary and outline.
pub fn parse_sections(response: &str) -> Summary {
    match (response.find(SUMMARY_MARKER), response.find(OUTLINE_MARKER)) {
        (Some(_), Some(o)) => {
            let summary = response[..o].replace(SUMMARY_MARKER, "");
            let outline = &response[o + OUTLINE_MARKER.len()..];
            Summary::new(summary.trim(), outline.trim())
        }
        _ => Summary::new(response.trim(), OUTLINE_UNSTRUCTURED),
    }
}

fn single_pass_prompt(title: &str, text: &str) -> String {
    format!(
        "Analyze and summarize the following content.\n\n\
Title: {title}\n\n\
Content:\n{text}\n\n\
Provide:\n\
1. a detailed prose summary (150-300 words)\n\
2. a structured outline of the main points\n\n\
Reply exactly in this format:\n\
{SUMMARY_MARKER}\n(summary)\n\n\
{OUTLINE_MARKER}\n1. first point\n2. second point\n..."
    )
}

fn chunk_prompt(title: &str, chunk: &str, idx: usize, total: usize) -> String {
    format!(
        "You are reading part {idx}/{total} of a long piece. Summarize the key information \
of this part in 60-100 words, keeping proper names and figures.\n\n\
Title: {title}\n\n\
Part {idx}/{total}:\n{chunk}"
    )
}

fn reduce_prompt(title: &str, partials: &str) -> String {
    format!(
        "Combine the following part summaries into one complete summary (about 250 words) \
and a structured outline of the whole piece.\n\n\
Title: {title}\n\n\
Part summaries:\n{partials}\n\n\
Reply exactly in this format:\n\
{SUMMARY_MARKER}\n(summary)\n\n\
{OUTLINE_MARKER}\n1. first point\n2. second point\n..."
    )
}

pub struct ChunkedSummarizer {
    model: Arc<dyn ChatModel>,
    cfg: SummarizerConfig,
}

impl ChunkedSummarizer {
    pub fn new(model: Arc<dyn ChatModel>, cfg: SummarizerConfig) -> Self {
        Self { model, cfg }
    }

    /// `OpenAiCompatible` when a key is configured, otherwise `DisabledModel`.
    pub fn from_config(llm: &LlmConfig, cfg: SummarizerConfig) -> anyhow::Result<Self> {
        let model: Arc<dyn ChatModel> = if llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            Arc::new(OpenAiCompatible::new(llm)?)
        } else {
            tracing::warn!("no llm api key configured, summaries will be placeholders");
            Arc::new(DisabledModel)
        };
        Ok(Self::new(model, cfg))
    }

    pub async fn summarize(&self, title: &str, text: &str) -> Summary {
        if !self.model.is_available() {
            return Summary::unavailable();
        }
        let text = text.trim();
        if text.is_empty() {
            return Summary::no_content();
        }

        match self.run(title, text).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(model = self.model.name(), error = %format!("{e:#}"), "summary generation failed");
                Summary::failed(&e)
            }
        }
    }

    async fn run(&self, title: &str, text: &str) -> anyhow::Result<Summary> {
        let chunks = split_into_chunks(
            text,
            self.cfg.chunk_char_limit,
            self.cfg.chunk_overlap,
            self.cfg.max_chunks,
        );

        if chunks.len() == 1 || !self.cfg.enable_chunking {
            let body = if self.cfg.enable_chunking { chunks[0] } else { text };
            let resp = self
                .call(&single_pass_prompt(title, body), self.cfg.final_summary_max_tokens)
                .await?;
            return Ok(parse_sections(&resp));
        }

        let total = chunks.len();
        tracing::debug!(total, chars = text.chars().count(), "summarizing in chunks");
        let mut partials = Vec::with_capacity(total);
        for (i, chunk) in chunks.iter().enumerate() {
            let idx = i + 1;
            let part = self
                .call(&chunk_prompt(title, chunk, idx, total), self.cfg.chunk_summary_max_tokens)
                .await?;
            partials.push(format!("Part {idx}: {}", part.trim()));
        }

        let resp = self
            .call(&reduce_prompt(title, &partials.join("\n")), self.cfg.final_summary_max_tokens)
            .await?;
        Ok(parse_sections(&resp))
    }

    async fn call(&self, user: &str, max_tokens: u32) -> anyhow::Result<String> {
        counter!("summarizer_calls_total").increment(1);
        self.model
            .complete(SYSTEM_PROMPT, user, max_tokens, self.cfg.temperature)
            .await
    }
}
