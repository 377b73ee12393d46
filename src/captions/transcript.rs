// src/captions/transcript.rs
//! Fallback transcript lookup.
//!
//! The upstream timed-text service has shipped more than one response shape.
//! Each known shape gets its own adapter behind [`TranscriptService`]; the
//! adapter is picked once from configuration rather than tried per call.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{CaptionConfig, TranscriptApi};
use crate::error::{FetchError, FetchResult};

const TIMEDTEXT_LIST: &str = "https://video.google.com/timedtext";
const TIMEDTEXT_FETCH: &str = "https://www.youtube.com/api/timedtext";

/// A transcript the service claims to have for a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptInfo {
    pub language: String,
    pub name: String,
    pub is_generated: bool,
    /// The service offers machine translation for this track. The timed-text
    /// listing advertises translation targets per document, so every track in
    /// a listing with at least one `<target>` counts, unless the track itself
    /// says `cantran="false"`.
    pub is_translatable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedText {
    pub start: f64,
    pub duration: f64,
    pub text: String,
}

#[async_trait]
pub trait TranscriptService: Send + Sync {
    async fn list_transcripts(&self, video_id: &str) -> FetchResult<Vec<TranscriptInfo>>;

    /// Fetch one listed transcript, optionally machine-translated.
    async fn fetch(
        &self,
        video_id: &str,
        transcript: &TranscriptInfo,
        translate_to: Option<&str>,
    ) -> FetchResult<Vec<TimedText>>;
}

pub fn entries_to_text(entries: &[TimedText]) -> String {
    entries
        .iter()
        .map(|e| e.text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Response shape of the timed-text fetch endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedTextFormat {
    /// `fmt=json3`: `{"events":[{"tStartMs":..,"dDurationMs":..,"segs":[{"utf8":..}]}]}`
    Json3,
    /// Legacy body: `<transcript><text start=".." dur="..">..</text></transcript>`
    Xml,
}

/// Build the configured adapter, or `None` when the fallback is switched off.
pub fn select_transcript_service(cfg: &CaptionConfig) -> Result<Option<Arc<dyn TranscriptService>>> {
    let format = match cfg.transcript_api {
        TranscriptApi::Off => return Ok(None),
        TranscriptApi::Json3 => TimedTextFormat::Json3,
        TranscriptApi::Xml => TimedTextFormat::Xml,
    };
    tracing::info!(?format, "transcript fallback adapter selected");
    Ok(Some(Arc::new(TimedTextService::new(cfg, format)?)))
}

pub struct TimedTextService {
    client: reqwest::Client,
    format: TimedTextFormat,
}

impl TimedTextService {
    pub fn new(cfg: &CaptionConfig, format: TimedTextFormat) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(cfg.request_timeout_secs.max(1)));
        if let Some(proxy) = cfg.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid transcript proxy")?);
        }
        Ok(Self {
            client: builder.build().context("building transcript http client")?,
            format,
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> FetchResult<String> {
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP {status}")));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl TranscriptService for TimedTextService {
    async fn list_transcripts(&self, video_id: &str) -> FetchResult<Vec<TranscriptInfo>> {
        let body = self
            .get(TIMEDTEXT_LIST, &[("type", "list"), ("tlangs", "1"), ("v", video_id)])
            .await?;
        parse_track_list(&body)
    }

    async fn fetch(
        &self,
        video_id: &str,
        transcript: &TranscriptInfo,
        translate_to: Option<&str>,
    ) -> FetchResult<Vec<TimedText>> {
        let mut query: Vec<(&str, &str)> = vec![("v", video_id), ("lang", transcript.language.as_str())];
        if !transcript.name.is_empty() {
            query.push(("name", transcript.name.as_str()));
        }
        if transcript.is_generated {
            query.push(("kind", "asr"));
        }
        if let Some(t) = translate_to {
            query.push(("tlang", t));
        }
        match self.format {
            TimedTextFormat::Json3 => {
                query.push(("fmt", "json3"));
                let body = self.get(TIMEDTEXT_FETCH, &query).await?;
                parse_json3(&body)
            }
            TimedTextFormat::Xml => {
                let body = self.get(TIMEDTEXT_FETCH, &query).await?;
                parse_xml_transcript(&body)
            }
        }
    }
}

// ------------------------------------------------------------
// Shapes
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TrackList {
    #[serde(rename = "track", default)]
    tracks: Vec<ListedTrack>,
    // only their presence matters
    #[serde(rename = "target", default)]
    targets: Vec<serde::de::IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct ListedTrack {
    #[serde(rename = "@lang_code")]
    lang_code: String,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@kind", default)]
    kind: String,
    #[serde(rename = "@cantran", default)]
    cantran: Option<String>,
}

pub fn parse_track_list(xml: &str) -> FetchResult<Vec<TranscriptInfo>> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let list: TrackList = quick_xml::de::from_str(xml)
        .map_err(|e| FetchError::Malformed(format!("timedtext list: {e}")))?;
    let has_targets = !list.targets.is_empty();
    Ok(list
        .tracks
        .into_iter()
        .map(|t| TranscriptInfo {
            is_generated: t.kind == "asr",
            is_translatable: has_targets && t.cantran.as_deref() != Some("false"),
            language: t.lang_code,
            name: t.name,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,
    #[serde(rename = "dDurationMs", default)]
    duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

pub fn parse_json3(body: &str) -> FetchResult<Vec<TimedText>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: Json3 =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(format!("json3: {e}")))?;
    Ok(doc
        .events
        .into_iter()
        .filter_map(|ev| {
            let text: String = ev.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.trim().to_string();
            (!text.is_empty()).then(|| TimedText {
                start: ev.start_ms as f64 / 1000.0,
                duration: ev.duration_ms as f64 / 1000.0,
                text,
            })
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct XmlTranscript {
    #[serde(rename = "text", default)]
    lines: Vec<XmlLine>,
}

#[derive(Debug, Deserialize)]
struct XmlLine {
    #[serde(rename = "@start", default)]
    start: f64,
    #[serde(rename = "@dur", default)]
    dur: f64,
    #[serde(rename = "$text", default)]
    text: String,
}

pub fn parse_xml_transcript(body: &str) -> FetchResult<Vec<TimedText>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let doc: XmlTranscript = quick_xml::de::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("timedtext xml: {e}")))?;
    Ok(doc
        .lines
        .into_iter()
        .map(|l| TimedText {
            start: l.start,
            duration: l.dur,
            // body text is entity-escaped twice by the service
            text: html_escape::decode_html_entities(&l.text).to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_tracks_with_kind() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript_list docid="1">
<track id="0" name="" lang_code="en" lang_original="English" lang_default="true"/>
<track id="1" name="CC" lang_code="zh-Hans" kind="asr"/>
</transcript_list>"#;
        let list = parse_track_list(xml).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].language, "en");
        assert!(!list[0].is_generated);
        assert_eq!(list[1].name, "CC");
        assert!(list[1].is_generated);
        // no translation targets advertised
        assert!(list.iter().all(|t| !t.is_translatable));
    }

    #[test]
    fn translation_targets_mark_tracks_translatable() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript_list docid="1">
<track id="0" name="" lang_code="en" lang_original="English"/>
<track id="1" name="" lang_code="ko" cantran="false"/>
<target id="0" lang_code="de" lang_original="Deutsch"/>
<target id="1" lang_code="fr" lang_original="Français"/>
</transcript_list>"#;
        let list = parse_track_list(xml).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].is_translatable);
        assert!(!list[1].is_translatable);
    }

    #[test]
    fn json3_segments_join() {
        let body = r#"{"events":[{"tStartMs":0,"dDurationMs":1200,"segs":[{"utf8":"hello"},{"utf8":" there"}]},{"tStartMs":1200},{"tStartMs":1500,"dDurationMs":800,"segs":[{"utf8":"\n"}]},{"tStartMs":2300,"dDurationMs":900,"segs":[{"utf8":"bye"}]}]}"#;
        let out = parse_json3(body).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "hello there");
        assert!((out[1].start - 2.3).abs() < 1e-9);
        assert_eq!(entries_to_text(&out), "hello there bye");
    }

    #[test]
    fn xml_transcript_decodes_entities() {
        let body = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.5" dur="1.2">it&amp;#39;s here</text><text start="1.7" dur="2">next</text></transcript>"#;
        let out = parse_xml_transcript(body).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "it's here");
        assert_eq!(entries_to_text(&out), "it's here next");
    }
}
