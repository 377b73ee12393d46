// src/captions/download.rs
//! Caption downloads: bounded retries, anti-automation sniffing, playlists.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use url::Url;

use crate::config::CaptionConfig;
use crate::error::{FetchError, FetchResult};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Plain GET returning the body text on success.
#[async_trait]
pub trait CaptionHttp: Send + Sync {
    async fn get_text(&self, url: &str) -> FetchResult<String>;
}

pub struct ReqwestCaptionHttp {
    client: reqwest::Client,
}

impl ReqwestCaptionHttp {
    pub fn new(cfg: &CaptionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.request_timeout_secs));
        if let Some(proxy) = cfg.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid caption proxy")?);
        }
        let client = builder.build().context("building caption http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CaptionHttp for ReqwestCaptionHttp {
    async fn get_text(&self, url: &str) -> FetchResult<String> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Transient(format!("HTTP {status}")));
        }
        Ok(resp.text().await?)
    }
}

/// Per-call retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &CaptionConfig) -> Self {
        Self {
            attempts: cfg.max_retries.max(1),
            wait: Duration::from_secs(cfg.retry_wait_secs),
            timeout: Duration::from_secs(cfg.request_timeout_secs.max(1)),
        }
    }

    pub fn once(timeout: Duration) -> Self {
        Self {
            attempts: 1,
            wait: Duration::ZERO,
            timeout,
        }
    }
}

/// HTML error or challenge page instead of caption data.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(64).collect::<String>().to_ascii_lowercase();
    if head.starts_with("<!doctype html") {
        return true;
    }
    body.to_ascii_lowercase().contains("<html")
}

pub fn is_playlist(body: &str) -> bool {
    body.trim_start().starts_with("#EXTM3U")
}

/// Drop `range` query parameters, which make some caption hosts return a
/// partial body.
pub fn strip_range_param(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if url.query().is_none() {
        return raw.to_string();
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.eq_ignore_ascii_case("range"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

/// Download one locator with retries. Blocked responses return immediately
/// and are never retried against the same locator.
pub async fn download_with_retry<H: CaptionHttp + ?Sized>(
    http: &H,
    url: &str,
    policy: &RetryPolicy,
) -> FetchResult<String> {
    let url = strip_range_param(url);
    let mut last = FetchError::Transient("no attempt made".into());

    for attempt in 1..=policy.attempts.max(1) {
        counter!("caption_attempts_total").increment(1);
        match tokio::time::timeout(policy.timeout, http.get_text(&url)).await {
            Ok(Ok(body)) => {
                if looks_like_html(&body) {
                    counter!("caption_blocked_total").increment(1);
                    tracing::warn!(attempt, url = %url, "caption download returned html, treating as blocked");
                    return Err(FetchError::Blocked { locator: url });
                }
                return Ok(body);
            }
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => {
                tracing::warn!(attempt, error = %e, "caption download failed");
                last = e;
            }
            Err(_) => {
                tracing::warn!(attempt, "caption download timed out");
                last = FetchError::timeout(policy.timeout);
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.wait).await;
        }
    }
    Err(last)
}

/// Fetch a locator and, if it turns out to be a segment playlist, resolve and
/// concatenate every segment.
pub async fn download_caption<H: CaptionHttp + ?Sized>(
    http: &H,
    url: &str,
    policy: &RetryPolicy,
) -> FetchResult<String> {
    let body = download_with_retry(http, url, policy).await?;
    if !is_playlist(&body) {
        return Ok(body);
    }
    let base = strip_range_param(url);
    let merged = merge_playlist(http, &body, &base, policy).await;
    if merged.trim().is_empty() {
        return Err(FetchError::Malformed("playlist yielded no segments".into()));
    }
    Ok(merged)
}

async fn merge_playlist<H: CaptionHttp + ?Sized>(
    http: &H,
    playlist: &str,
    base_url: &str,
    policy: &RetryPolicy,
) -> String {
    let base = Url::parse(base_url).ok();
    let segment_urls: Vec<String> = playlist
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| match &base {
            Some(b) => b.join(l).ok().map(|u| u.to_string()),
            None => Url::parse(l).ok().map(|u| u.to_string()),
        })
        .collect();

    let mut combined: Vec<String> = Vec::new();
    for seg in segment_urls {
        match download_with_retry(http, &seg, policy).await {
            Ok(text) => {
                let mut lines = text.lines().peekable();
                if lines
                    .peek()
                    .is_some_and(|first| first.trim().to_ascii_uppercase().starts_with("WEBVTT"))
                {
                    lines.next();
                }
                combined.extend(lines.map(str::to_string));
            }
            Err(e) => tracing::debug!(segment = %seg, error = %e, "playlist segment skipped"),
        }
    }
    combined.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_sniffing() {
        assert!(looks_like_html("  <!DOCTYPE html><p>captcha</p>"));
        assert!(looks_like_html("<HTML><body>sorry</body></HTML>"));
        assert!(!looks_like_html("WEBVTT\n\n00:00.000 --> 00:01.000\nhi"));
    }

    #[test]
    fn range_param_removed_others_kept() {
        let out = strip_range_param("https://c.example/api/timedtext?v=1&range=0-100&fmt=vtt");
        assert_eq!(out, "https://c.example/api/timedtext?v=1&fmt=vtt");
        let only = strip_range_param("https://c.example/s?Range=5");
        assert_eq!(only, "https://c.example/s");
        assert_eq!(strip_range_param("not a url"), "not a url");
    }
}
