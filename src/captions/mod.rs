// src/captions/mod.rs
//! Caption retrieval: best available transcript text for a video id.
//!
//! Order of attempts:
//! 1) caption tracks from the metadata provider, manual before auto by default,
//!    language by exact tag then primary-subtag prefix (any track only when
//!    nothing matches), formats by priority;
//! 2) the fallback transcript service: preferred languages, then machine
//!    translation, then whatever transcript exists.
//!
//! Every stage degrades to the next one. Exhausting all of them yields an
//! empty string, which is a normal outcome and not an error.

pub mod clean;
pub mod download;
pub mod tracks;
pub mod transcript;

use std::sync::Arc;

use metrics::counter;

use crate::config::CaptionConfig;
pub use clean::clean_captions;
pub use download::{CaptionHttp, ReqwestCaptionHttp, RetryPolicy};
pub use tracks::{Track, TrackProvider, TrackSet, YtDlpTracks};
pub use transcript::{TranscriptInfo, TranscriptService};

/// Format preference, best first. Unknown formats go last.
pub const FORMAT_PRIORITY: &[&str] = &["vtt", "srv3", "srv2", "srt", "ttml", "json3"];

/// Expand generic language preferences into the regional tags providers use.
/// Output is lowercase and deduplicated, preserving order.
pub fn expand_languages<S: AsRef<str>>(langs: &[S]) -> Vec<String> {
    const ZH: &[&str] = &["zh", "zh-hans", "zh-hant", "zh-cn", "zh-tw", "zh-hk"];
    const EN: &[&str] = &["en", "en-us", "en-gb"];

    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    };
    for l in langs {
        let l = l.as_ref().trim().to_ascii_lowercase();
        if l.is_empty() {
            continue;
        }
        if l.starts_with("zh") {
            push(&l);
            ZH.iter().for_each(|v| push(v));
        } else if l.starts_with("en") {
            push(&l);
            EN.iter().for_each(|v| push(v));
        } else {
            push(&l);
        }
    }
    out
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// Languages to try, best first: exact matches in preference order, then
/// prefix matches. Empty when nothing matches.
pub fn matching_languages(available: &[String], preferred: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for p in preferred {
        if let Some(a) = available.iter().find(|a| a.eq_ignore_ascii_case(p)) {
            if !out.contains(a) {
                out.push(a.clone());
            }
        }
    }
    for p in preferred {
        let prefix = primary_subtag(p);
        for a in available {
            if primary_subtag(a).eq_ignore_ascii_case(prefix) && !out.contains(a) {
                out.push(a.clone());
            }
        }
    }
    out
}

/// First language to use from `available`, if any matches.
pub fn choose_language(available: &[String], preferred: &[String]) -> Option<String> {
    matching_languages(available, preferred).into_iter().next()
}

fn format_rank(ext: &str) -> usize {
    FORMAT_PRIORITY
        .iter()
        .position(|p| p.eq_ignore_ascii_case(ext))
        .unwrap_or(FORMAT_PRIORITY.len())
}

/// Stable sort by format priority.
pub fn order_formats(tracks: &mut [Track]) {
    tracks.sort_by_key(|t| format_rank(&t.ext));
}

pub struct CaptionPipeline {
    tracks: Arc<dyn TrackProvider>,
    http: Arc<dyn CaptionHttp>,
    transcripts: Option<Arc<dyn TranscriptService>>,
    cfg: CaptionConfig,
}

impl CaptionPipeline {
    pub fn new(
        tracks: Arc<dyn TrackProvider>,
        http: Arc<dyn CaptionHttp>,
        transcripts: Option<Arc<dyn TranscriptService>>,
        cfg: CaptionConfig,
    ) -> Self {
        Self {
            tracks,
            http,
            transcripts,
            cfg,
        }
    }

    /// Production wiring: yt-dlp metadata, reqwest downloads, configured fallback adapter.
    pub fn from_config(cfg: &CaptionConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            Arc::new(YtDlpTracks::new(cfg)),
            Arc::new(ReqwestCaptionHttp::new(cfg)?),
            transcript::select_transcript_service(cfg)?,
            cfg.clone(),
        ))
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.cfg
    }

    /// Best available transcript text, or `""` when nothing could be retrieved.
    pub async fn extract(&self, content_id: &str, preferred: &[String]) -> String {
        if !self.cfg.enabled {
            return String::new();
        }
        let langs = if preferred.is_empty() {
            expand_languages(&self.cfg.languages)
        } else {
            expand_languages(preferred)
        };
        let policy = RetryPolicy::from_config(&self.cfg);

        match self.tracks.list_tracks(content_id).await {
            Ok(set) => {
                for group in self.ordered_groups(set) {
                    if let Some(text) = self.extract_from_group(group, &langs, &policy).await {
                        tracing::info!(video_id = %content_id, len = text.len(), "captions extracted from tracks");
                        return text;
                    }
                }
                tracing::info!(video_id = %content_id, "no usable caption track, trying transcript fallback");
            }
            Err(e) => {
                tracing::warn!(video_id = %content_id, error = %e, "caption metadata unavailable");
            }
        }

        let text = self.fallback(content_id, &langs).await;
        if text.is_empty() {
            counter!("caption_empty_total").increment(1);
            tracing::info!(video_id = %content_id, "no captions available");
        }
        text
    }

    fn ordered_groups(&self, set: TrackSet) -> Vec<Vec<Track>> {
        let TrackSet { manual, auto } = set;
        let has_manual = !manual.is_empty();
        let has_auto = !auto.is_empty();

        let mut groups = Vec::new();
        let mut manual = Some(manual);
        let mut auto = Some(auto);
        if self.cfg.prefer_manual {
            if has_manual {
                groups.extend(manual.take());
            }
            if has_auto && self.cfg.allow_auto {
                groups.extend(auto.take());
            }
        } else {
            if has_auto && self.cfg.allow_auto {
                groups.extend(auto.take());
            }
            if has_manual {
                groups.extend(manual.take());
            }
        }
        if groups.is_empty() {
            // neither preference applied: whichever group exists
            if has_manual {
                groups.extend(manual.take());
            } else if has_auto {
                groups.extend(auto.take());
            }
        }
        groups
    }

    async fn extract_from_group(
        &self,
        tracks: Vec<Track>,
        langs: &[String],
        policy: &RetryPolicy,
    ) -> Option<String> {
        let mut available: Vec<String> = Vec::new();
        for t in &tracks {
            if !available.contains(&t.lang) {
                available.push(t.lang.clone());
            }
        }

        let mut candidates = matching_languages(&available, langs);
        if candidates.is_empty() {
            candidates = available;
        }

        for lang in candidates {
            let mut formats: Vec<Track> = tracks.iter().filter(|t| t.lang == lang).cloned().collect();
            order_formats(&mut formats);
            if let Some(text) = self.try_formats(&formats, policy).await {
                return Some(text);
            }
        }
        None
    }

    async fn try_formats(&self, formats: &[Track], policy: &RetryPolicy) -> Option<String> {
        for fmt in formats {
            match download::download_caption(self.http.as_ref(), &fmt.url, policy).await {
                Ok(raw) => {
                    let text = clean_captions(&raw, Some(fmt.ext.as_str()));
                    if !text.is_empty() {
                        return Some(text);
                    }
                    tracing::debug!(lang = %fmt.lang, ext = %fmt.ext, "caption format was empty after cleaning");
                }
                Err(e) => {
                    tracing::warn!(lang = %fmt.lang, ext = %fmt.ext, error = %e, "caption format failed");
                }
            }
        }
        None
    }

    async fn fallback(&self, video_id: &str, langs: &[String]) -> String {
        let Some(service) = &self.transcripts else {
            return String::new();
        };
        let listed = match service.list_transcripts(video_id).await {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(video_id = %video_id, error = %e, "transcript listing failed");
                return String::new();
            }
        };
        if listed.is_empty() {
            return String::new();
        }

        let search: Vec<String> = if langs.is_empty() {
            expand_languages(&self.cfg.transcript_languages)
        } else {
            langs.to_vec()
        };

        // 1) preferred languages
        for lang in &search {
            let Some(t) = listed.iter().find(|t| t.language.eq_ignore_ascii_case(lang)) else {
                continue;
            };
            if let Some(text) = self.fetch_text(service.as_ref(), video_id, t, None).await {
                return text;
            }
        }

        // 2) machine translation
        if let Some(target) = self.cfg.translate_to.as_deref() {
            for t in listed.iter().filter(|t| t.is_translatable) {
                if let Some(text) = self.fetch_text(service.as_ref(), video_id, t, Some(target)).await {
                    return text;
                }
            }
        }

        // 3) anything
        for t in &listed {
            if let Some(text) = self.fetch_text(service.as_ref(), video_id, t, None).await {
                return text;
            }
        }
        String::new()
    }

    async fn fetch_text(
        &self,
        service: &dyn TranscriptService,
        video_id: &str,
        t: &TranscriptInfo,
        translate_to: Option<&str>,
    ) -> Option<String> {
        match service.fetch(video_id, t, translate_to).await {
            Ok(entries) => {
                let text = transcript::entries_to_text(&entries);
                (!text.is_empty()).then_some(text)
            }
            Err(e) => {
                tracing::debug!(lang = %t.language, error = %e, "transcript fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn expands_chinese_and_english() {
        let out = expand_languages(&["zh", "EN", "ja", "en"]);
        assert_eq!(
            out,
            s(&["zh", "zh-hans", "zh-hant", "zh-cn", "zh-tw", "zh-hk", "en", "en-us", "en-gb", "ja"])
        );
    }

    #[test]
    fn exact_beats_prefix() {
        let avail = s(&["en-US", "en", "de"]);
        assert_eq!(choose_language(&avail, &s(&["en"])).as_deref(), Some("en"));
        assert_eq!(choose_language(&avail, &s(&["en-gb"])).as_deref(), Some("en-US"));
        assert_eq!(choose_language(&avail, &s(&["fr"])), None);
        assert_eq!(
            matching_languages(&avail, &s(&["de", "en"])),
            s(&["de", "en", "en-US"])
        );
    }

    #[test]
    fn formats_sorted_by_priority() {
        let mut t = vec![
            Track::new("en", "json3", "u1"),
            Track::new("en", "weird", "u2"),
            Track::new("en", "srt", "u3"),
            Track::new("en", "vtt", "u4"),
        ];
        order_formats(&mut t);
        let exts: Vec<&str> = t.iter().map(|x| x.ext.as_str()).collect();
        assert_eq!(exts, vec!["vtt", "srt", "json3", "weird"]);
    }
}
