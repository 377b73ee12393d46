// tests/summarizer.rs
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use content_monitor::config::SummarizerConfig;
use content_monitor::summarize::{
    split_into_chunks, ChatModel, ChunkedSummarizer, DisabledModel, OUTLINE_NO_CONTENT,
    OUTLINE_UNAVAILABLE, OUTLINE_UNSTRUCTURED, SUMMARY_NO_CONTENT, SUMMARY_UNAVAILABLE,
};
use parking_lot::Mutex;
use rand::Rng;

/// Records every prompt. Part prompts get "S<i>" back; anything else gets a
/// two-section answer echoing which part summaries it saw.
#[derive(Default)]
struct RecordingModel {
    calls: Mutex<Vec<(String, u32)>>,
    fail: bool,
}

#[async_trait]
impl ChatModel for RecordingModel {
    async fn complete(&self, _system: &str, user: &str, max_tokens: u32, _t: f32) -> Result<String> {
        self.calls.lock().push((user.to_string(), max_tokens));
        if self.fail {
            bail!("quota exceeded");
        }
        if let Some(rest) = user.split("You are reading part ").nth(1) {
            let idx = rest.split('/').next().unwrap_or("?");
            return Ok(format!("S{idx}"));
        }
        let seen: Vec<&str> = ["S1", "S2", "S3"].into_iter().filter(|s| user.contains(s)).collect();
        Ok(format!("[SUMMARY]\nbased on {}\n[OUTLINE]\n1. point", seen.join(",")))
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

fn cfg() -> SummarizerConfig {
    SummarizerConfig {
        chunk_char_limit: 5_000,
        chunk_overlap: 400,
        max_chunks: 6,
        ..SummarizerConfig::default()
    }
}

#[test]
fn twelve_thousand_chars_make_three_chunks() {
    let text = "x".repeat(12_000);
    let chunks = split_into_chunks(&text, 5_000, 400, 6);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].len(), 5_000);
    assert_eq!(chunks[2].len(), 12_000 - 2 * 4_600);
}

#[test]
fn chunks_reassemble_and_respect_the_cap() {
    let mut rng = rand::rng();
    for _ in 0..300 {
        let len = rng.random_range(1..400);
        let text: String = (0..len)
            .map(|_| if rng.random_bool(0.2) { 'é' } else { rng.random_range('a'..='z') })
            .collect();
        let size = rng.random_range(1..60);
        let overlap = rng.random_range(0..40);
        let max = rng.random_range(1..8);

        let chunks = split_into_chunks(&text, size, overlap, max);
        assert!(chunks.len() <= max + 1);

        let eff_overlap = overlap.min(size / 2);
        let mut rebuilt = chunks[0].to_string();
        for c in &chunks[1..] {
            rebuilt.extend(c.chars().skip(eff_overlap));
        }
        assert_eq!(rebuilt, text, "size={size} overlap={overlap} max={max}");
    }
}

#[tokio::test]
async fn long_text_maps_each_chunk_then_reduces_once() {
    let model = Arc::new(RecordingModel::default());
    let s = ChunkedSummarizer::new(model.clone(), cfg());

    let text: String = (0..12_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let out = s.summarize("Long talk", &text).await;

    let calls = model.calls.lock();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].0.contains("part 1/3"));
    assert!(calls[2].0.contains("part 3/3"));
    assert!(calls[..3].iter().all(|(_, t)| *t == 600));
    assert_eq!(calls[3].1, 1000);
    assert!(calls[3].0.contains("Part 1: S1") && calls[3].0.contains("Part 3: S3"));

    assert_eq!(out.summary, "based on S1,S2,S3");
    assert_eq!(out.outline, "1. point");
}

#[tokio::test]
async fn short_text_is_one_request() {
    let model = Arc::new(RecordingModel::default());
    let s = ChunkedSummarizer::new(model.clone(), cfg());
    let out = s.summarize("Short", "just a few words").await;
    assert_eq!(model.calls.lock().len(), 1);
    assert_eq!(out.outline, "1. point");
}

#[tokio::test]
async fn chunking_disabled_sends_everything_at_once() {
    let model = Arc::new(RecordingModel::default());
    let s = ChunkedSummarizer::new(
        model.clone(),
        SummarizerConfig {
            enable_chunking: false,
            ..cfg()
        },
    );
    let text = "y".repeat(12_000);
    s.summarize("t", &text).await;
    let calls = model.calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains(&text));
}

#[tokio::test]
async fn empty_text_gives_placeholders_without_calls() {
    let model = Arc::new(RecordingModel::default());
    let s = ChunkedSummarizer::new(model.clone(), cfg());
    let out = s.summarize("Title", "   \n").await;
    assert_eq!(out.summary, SUMMARY_NO_CONTENT);
    assert_eq!(out.outline, OUTLINE_NO_CONTENT);
    assert!(model.calls.lock().is_empty());
}

#[tokio::test]
async fn disabled_model_gives_unavailable_placeholders() {
    let s = ChunkedSummarizer::new(Arc::new(DisabledModel), cfg());
    let out = s.summarize("Title", "plenty of text").await;
    assert_eq!(out.summary, SUMMARY_UNAVAILABLE);
    assert_eq!(out.outline, OUTLINE_UNAVAILABLE);
}

#[tokio::test]
async fn model_errors_are_reported_in_both_fields() {
    let model = Arc::new(RecordingModel {
        fail: true,
        ..Default::default()
    });
    let s = ChunkedSummarizer::new(model, cfg());
    let out = s.summarize("Title", "some text").await;
    assert!(out.summary.contains("quota exceeded"));
    assert!(out.outline.contains("quota exceeded"));
}

struct ProseModel;

#[async_trait]
impl ChatModel for ProseModel {
    async fn complete(&self, _: &str, _: &str, _: u32, _: f32) -> Result<String> {
        Ok("A plain answer without the requested sections.".into())
    }
    fn name(&self) -> &'static str {
        "prose"
    }
}

#[tokio::test]
async fn unstructured_reply_keeps_text_as_summary() {
    let s = ChunkedSummarizer::new(Arc::new(ProseModel), cfg());
    let out = s.summarize("Title", "text").await;
    assert_eq!(out.summary, "A plain answer without the requested sections.");
    assert_eq!(out.outline, OUTLINE_UNSTRUCTURED);
}
