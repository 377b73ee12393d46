// src/captions/tracks.rs
//! Caption track metadata, served by `yt-dlp -J`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::CaptionConfig;
use crate::error::{FetchError, FetchResult};
use crate::feed::watch_url;

/// One downloadable format of one caption language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub lang: String,
    pub ext: String,
    pub url: String,
}

impl Track {
    pub fn new(lang: impl Into<String>, ext: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            ext: ext.into(),
            url: url.into(),
        }
    }
}

/// Tracks split by authorship, in provider order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSet {
    pub manual: Vec<Track>,
    pub auto: Vec<Track>,
}

impl TrackSet {
    pub fn is_empty(&self) -> bool {
        self.manual.is_empty() && self.auto.is_empty()
    }
}

#[async_trait]
pub trait TrackProvider: Send + Sync {
    async fn list_tracks(&self, content_id: &str) -> FetchResult<TrackSet>;
}

#[derive(Debug, Deserialize)]
struct YtInfo {
    #[serde(default)]
    subtitles: BTreeMap<String, Vec<YtFormat>>,
    #[serde(default)]
    automatic_captions: BTreeMap<String, Vec<YtFormat>>,
}

#[derive(Debug, Deserialize)]
struct YtFormat {
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

fn flatten(groups: BTreeMap<String, Vec<YtFormat>>) -> Vec<Track> {
    let mut out = Vec::new();
    for (lang, formats) in groups {
        // "live_chat" is a chat replay, not captions
        if lang == "live_chat" {
            continue;
        }
        for f in formats {
            if let Some(url) = f.url.filter(|u| !u.is_empty()) {
                out.push(Track {
                    lang: lang.clone(),
                    ext: f.ext.unwrap_or_default(),
                    url,
                });
            }
        }
    }
    out
}

/// Parse the JSON document printed by `yt-dlp -J`.
pub fn parse_ytdlp_info(json: &str) -> FetchResult<TrackSet> {
    let info: YtInfo =
        serde_json::from_str(json).map_err(|e| FetchError::Malformed(format!("yt-dlp json: {e}")))?;
    Ok(TrackSet {
        manual: flatten(info.subtitles),
        auto: flatten(info.automatic_captions),
    })
}

pub struct YtDlpTracks {
    binary: String,
    timeout: Duration,
    cookie_file: Option<PathBuf>,
    proxy: Option<String>,
}

impl YtDlpTracks {
    pub fn new(cfg: &CaptionConfig) -> Self {
        let cookie_file = cfg.cookie_file.clone().filter(|p| {
            let exists = p.exists();
            if !exists {
                tracing::warn!(path = %p.display(), "cookie file not found, ignoring");
            }
            exists
        });
        Self {
            binary: cfg.ytdlp_path.clone(),
            timeout: Duration::from_secs(cfg.ytdlp_timeout_secs.max(1)),
            cookie_file,
            proxy: cfg.proxy.clone(),
        }
    }
}

#[async_trait]
impl TrackProvider for YtDlpTracks {
    async fn list_tracks(&self, content_id: &str) -> FetchResult<TrackSet> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(["-J", "--skip-download", "--no-warnings", "--no-playlist"]);
        if let Some(cookies) = &self.cookie_file {
            cmd.arg("--cookies").arg(cookies);
        }
        if let Some(proxy) = &self.proxy {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd.arg(watch_url(content_id));
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::Unavailable(format!("{} not installed", self.binary)));
            }
            Ok(Err(e)) => return Err(FetchError::Transient(format!("running yt-dlp: {e}"))),
            Err(_) => return Err(FetchError::timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Transient(format!(
                "yt-dlp exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        parse_ytdlp_info(String::from_utf8_lossy(&output.stdout).trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_manual_and_auto_and_skips_chat() {
        let json = r#"{
          "id": "abc",
          "subtitles": {
            "en-US": [{"ext": "vtt", "url": "https://c/en-us.vtt"}, {"ext": "srt", "url": ""}],
            "live_chat": [{"ext": "json", "url": "https://c/chat"}]
          },
          "automatic_captions": {
            "en": [{"ext": "srv3", "url": "https://c/en.srv3"}, {"ext": "vtt", "url": "https://c/en.vtt"}]
          }
        }"#;
        let set = parse_ytdlp_info(json).unwrap();
        assert_eq!(set.manual, vec![Track::new("en-US", "vtt", "https://c/en-us.vtt")]);
        assert_eq!(set.auto.len(), 2);
        assert_eq!(set.auto[1].ext, "vtt");
    }

    #[test]
    fn missing_groups_are_empty() {
        let set = parse_ytdlp_info(r#"{"id":"x"}"#).unwrap();
        assert!(set.is_empty());
        assert!(matches!(parse_ytdlp_info("nope"), Err(FetchError::Malformed(_))));
    }
}
