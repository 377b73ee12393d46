// tests/captions_pipeline.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use content_monitor::captions::transcript::TimedText;
use content_monitor::captions::{
    CaptionHttp, CaptionPipeline, Track, TrackProvider, TrackSet, TranscriptInfo, TranscriptService,
};
use content_monitor::config::CaptionConfig;
use content_monitor::error::{FetchError, FetchResult};
use parking_lot::Mutex;

// ---- fakes ----

struct FakeTracks(FetchResult<TrackSet>);

#[async_trait]
impl TrackProvider for FakeTracks {
    async fn list_tracks(&self, _content_id: &str) -> FetchResult<TrackSet> {
        match &self.0 {
            Ok(set) => Ok(set.clone()),
            Err(_) => Err(FetchError::Unavailable("yt-dlp not installed".into())),
        }
    }
}

/// Serves fixed bodies by URL and records every request.
#[derive(Default)]
struct FakeHttp {
    bodies: HashMap<String, String>,
    hits: Mutex<Vec<String>>,
}

impl FakeHttp {
    fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            bodies: pairs.iter().map(|(u, b)| (u.to_string(), b.to_string())).collect(),
            hits: Mutex::new(Vec::new()),
        }
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }
}

#[async_trait]
impl CaptionHttp for FakeHttp {
    async fn get_text(&self, url: &str) -> FetchResult<String> {
        self.hits.lock().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Transient("HTTP 503".into()))
    }
}

/// Transcript service where each (language, translation) pair can yield text.
#[derive(Default)]
struct FakeTranscripts {
    listed: Vec<TranscriptInfo>,
    texts: HashMap<(String, Option<String>), String>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl TranscriptService for FakeTranscripts {
    async fn list_transcripts(&self, _video_id: &str) -> FetchResult<Vec<TranscriptInfo>> {
        Ok(self.listed.clone())
    }

    async fn fetch(
        &self,
        _video_id: &str,
        t: &TranscriptInfo,
        translate_to: Option<&str>,
    ) -> FetchResult<Vec<TimedText>> {
        let key = (t.language.clone(), translate_to.map(str::to_string));
        self.calls.lock().push(key.clone());
        match self.texts.get(&key) {
            Some(text) => Ok(vec![TimedText {
                start: 0.0,
                duration: 1.0,
                text: text.clone(),
            }]),
            None => Err(FetchError::Transient("HTTP 404".into())),
        }
    }
}

fn info(lang: &str, translatable: bool) -> TranscriptInfo {
    TranscriptInfo {
        language: lang.into(),
        name: lang.into(),
        is_generated: false,
        is_translatable: translatable,
    }
}

fn cfg() -> CaptionConfig {
    CaptionConfig {
        languages: vec!["en".into()],
        max_retries: 2,
        retry_wait_secs: 0,
        ..CaptionConfig::default()
    }
}

const VTT: &str = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nHello <b>world</b>\n\n2\n00:00:02.000 --> 00:00:04.000\nHello <b>world</b>\n\n3\n00:00:04.000 --> 00:00:06.000\nsecond line\n";

fn pipeline(
    tracks: TrackSet,
    http: Arc<FakeHttp>,
    transcripts: Option<Arc<FakeTranscripts>>,
    cfg: CaptionConfig,
) -> CaptionPipeline {
    CaptionPipeline::new(
        Arc::new(FakeTracks(Ok(tracks))),
        http,
        transcripts.map(|t| t as Arc<dyn TranscriptService>),
        cfg,
    )
}

// ---- tracks ----

#[tokio::test]
async fn manual_track_wins_over_auto() {
    let http = Arc::new(FakeHttp::with(&[
        ("https://c.test/manual.vtt", VTT),
        ("https://c.test/auto.vtt", "WEBVTT\n\nauto text\n"),
    ]));
    let set = TrackSet {
        manual: vec![Track::new("en", "vtt", "https://c.test/manual.vtt")],
        auto: vec![Track::new("en", "vtt", "https://c.test/auto.vtt")],
    };
    let text = pipeline(set, http.clone(), None, cfg()).extract("vid", &[]).await;

    assert_eq!(text, "Hello world second line");
    assert_eq!(http.hits(), vec!["https://c.test/manual.vtt"]);
}

#[tokio::test]
async fn cues_opening_with_header_words_survive_extraction() {
    let body = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nRegional sales rose five percent\n\n\
00:00:02.000 --> 00:00:04.000\nNotes from the board meeting\n\n\
00:00:04.000 --> 00:00:06.000\nStyle matters here\n";
    let http = Arc::new(FakeHttp::with(&[("https://c.test/talk.vtt", body)]));
    let set = TrackSet {
        manual: vec![Track::new("en", "vtt", "https://c.test/talk.vtt")],
        auto: Vec::new(),
    };
    let text = pipeline(set, http, None, cfg()).extract("vid", &[]).await;

    assert_eq!(
        text,
        "Regional sales rose five percent Notes from the board meeting Style matters here"
    );
}

#[tokio::test]
async fn auto_first_when_manual_not_preferred() {
    let http = Arc::new(FakeHttp::with(&[
        ("https://c.test/manual.vtt", VTT),
        ("https://c.test/auto.vtt", "WEBVTT\n\nauto text\n"),
    ]));
    let set = TrackSet {
        manual: vec![Track::new("en", "vtt", "https://c.test/manual.vtt")],
        auto: vec![Track::new("en", "vtt", "https://c.test/auto.vtt")],
    };
    let cfg = CaptionConfig {
        prefer_manual: false,
        ..cfg()
    };
    let text = pipeline(set, http, None, cfg).extract("vid", &[]).await;
    assert_eq!(text, "auto text");
}

#[tokio::test]
async fn html_response_moves_to_next_format_without_retry() {
    let http = Arc::new(FakeHttp::with(&[
        ("https://c.test/en.vtt", "<!DOCTYPE html><title>unusual traffic</title>"),
        ("https://c.test/en.srt", "1\n00:00:00,000 --> 00:00:01,000\nfrom srt\n"),
    ]));
    let set = TrackSet {
        manual: vec![
            Track::new("en", "srt", "https://c.test/en.srt"),
            Track::new("en", "vtt", "https://c.test/en.vtt"),
        ],
        auto: vec![],
    };
    let text = pipeline(set, http.clone(), None, cfg()).extract("vid", &[]).await;

    assert_eq!(text, "from srt");
    // vtt ranks first; the blocked locator is fetched exactly once
    assert_eq!(http.hits(), vec!["https://c.test/en.vtt", "https://c.test/en.srt"]);
}

#[tokio::test]
async fn transient_failures_are_retried_up_to_the_budget() {
    let http = Arc::new(FakeHttp::default());
    let set = TrackSet {
        manual: vec![Track::new("en", "vtt", "https://c.test/down.vtt")],
        auto: vec![],
    };
    let text = pipeline(set, http.clone(), None, cfg()).extract("vid", &[]).await;
    assert_eq!(text, "");
    assert_eq!(http.hits().len(), 2);
}

#[tokio::test]
async fn playlist_segments_are_merged() {
    let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:10\nseg1.vtt\n#EXTINF:10,\nseg2.vtt\n";
    let http = Arc::new(FakeHttp::with(&[
        ("https://c.test/hls/index.m3u8?lang=en", playlist),
        ("https://c.test/hls/seg1.vtt", "WEBVTT\n\n00:00.000 --> 00:01.000\nfirst part\n"),
        ("https://c.test/hls/seg2.vtt", "WEBVTT\n\n00:01.000 --> 00:02.000\nsecond part\n"),
    ]));
    let set = TrackSet {
        manual: vec![Track::new(
            "en",
            "vtt",
            "https://c.test/hls/index.m3u8?lang=en&range=0-999",
        )],
        auto: vec![],
    };
    let text = pipeline(set, http, None, cfg()).extract("vid", &[]).await;
    assert_eq!(text, "first part second part");
}

#[tokio::test]
async fn unmatched_language_falls_back_to_any_track() {
    let http = Arc::new(FakeHttp::with(&[("https://c.test/de.vtt", "WEBVTT\n\nhallo\n")]));
    let set = TrackSet {
        manual: vec![Track::new("de", "vtt", "https://c.test/de.vtt")],
        auto: vec![],
    };
    let text = pipeline(set, http, None, cfg()).extract("vid", &[]).await;
    assert_eq!(text, "hallo");
}

#[tokio::test]
async fn regional_track_matches_generic_preference() {
    let http = Arc::new(FakeHttp::with(&[
        ("https://c.test/de.vtt", "WEBVTT\n\nhallo\n"),
        ("https://c.test/en-gb.vtt", "WEBVTT\n\ncheerio\n"),
    ]));
    let set = TrackSet {
        manual: vec![
            Track::new("de", "vtt", "https://c.test/de.vtt"),
            Track::new("en-GB", "vtt", "https://c.test/en-gb.vtt"),
        ],
        auto: vec![],
    };
    let text = pipeline(set, http, None, cfg()).extract("vid", &[]).await;
    assert_eq!(text, "cheerio");
}

// ---- fallback service ----

#[tokio::test]
async fn everything_failing_yields_empty_text() {
    let http = Arc::new(FakeHttp::default());
    let transcripts = Arc::new(FakeTranscripts {
        listed: vec![info("en", true)],
        ..Default::default()
    });
    let p = CaptionPipeline::new(
        Arc::new(FakeTracks(Err(FetchError::Unavailable("x".into())))),
        http,
        Some(transcripts),
        cfg(),
    );
    assert_eq!(p.extract("vid", &[]).await, "");
}

#[tokio::test]
async fn fallback_prefers_languages_then_translation_then_anything() {
    let mut texts = HashMap::new();
    texts.insert(("fr".to_string(), Some("en".to_string())), "translated".to_string());
    texts.insert(("ja".to_string(), None), "original japanese".to_string());
    let svc = Arc::new(FakeTranscripts {
        listed: vec![info("fr", true), info("ja", false)],
        texts,
        ..Default::default()
    });
    let cfg = CaptionConfig {
        translate_to: Some("en".into()),
        ..cfg()
    };
    let p = pipeline(TrackSet::default(), Arc::new(FakeHttp::default()), Some(svc.clone()), cfg);
    assert_eq!(p.extract("vid", &[]).await, "translated");
    assert_eq!(
        svc.calls.lock().clone(),
        vec![("fr".to_string(), Some("en".to_string()))]
    );
}

#[tokio::test]
async fn fallback_takes_any_transcript_last() {
    let mut texts = HashMap::new();
    texts.insert(("ja".to_string(), None), "original japanese".to_string());
    let svc = Arc::new(FakeTranscripts {
        listed: vec![info("ja", false)],
        texts,
        ..Default::default()
    });
    let p = pipeline(TrackSet::default(), Arc::new(FakeHttp::default()), Some(svc), cfg());
    assert_eq!(p.extract("vid", &[]).await, "original japanese");
}

#[tokio::test]
async fn explicit_preference_overrides_config_languages() {
    let mut texts = HashMap::new();
    texts.insert(("en".to_string(), None), "english".to_string());
    texts.insert(("es".to_string(), None), "español".to_string());
    let svc = Arc::new(FakeTranscripts {
        listed: vec![info("en", false), info("es", false)],
        texts,
        ..Default::default()
    });
    let p = pipeline(TrackSet::default(), Arc::new(FakeHttp::default()), Some(svc), cfg());
    assert_eq!(p.extract("vid", &["es".to_string()]).await, "español");
}

#[tokio::test]
async fn disabled_pipeline_returns_empty_without_requests() {
    let http = Arc::new(FakeHttp::with(&[("https://c.test/en.vtt", VTT)]));
    let set = TrackSet {
        manual: vec![Track::new("en", "vtt", "https://c.test/en.vtt")],
        auto: vec![],
    };
    let cfg = CaptionConfig {
        enabled: false,
        ..cfg()
    };
    assert_eq!(pipeline(set, http.clone(), None, cfg).extract("vid", &[]).await, "");
    assert!(http.hits().is_empty());
}
