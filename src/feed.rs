// src/feed.rs
//! Feed fetching and parsing (Atom, as served for video channels, and RSS 2.0).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;

use crate::model::RawFeedEntry;

const CHANNEL_FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";
const WATCH_BASE: &str = "https://www.youtube.com/watch?v=";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_feed(&self, address: &str) -> Result<Vec<RawFeedEntry>>;

    /// Channel id for a configured channel URL. The default only understands
    /// `/channel/<id>` URLs.
    async fn resolve_channel_id(&self, channel_url: &str) -> Result<Option<String>> {
        Ok(channel_id_from_url(&ensure_scheme(channel_url)))
    }
}

// ------------------------------------------------------------
// XML shapes
// ------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(default)]
    title: Option<Text>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: Option<String>,
    /// `yt:videoId`; the deserializer matches on the local name.
    #[serde(rename = "videoId", default)]
    video_id: Option<String>,
    #[serde(default)]
    title: Option<Text>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    /// `media:group`
    #[serde(default)]
    group: Option<MediaGroup>,
    #[serde(default)]
    summary: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: Option<String>,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaGroup {
    #[serde(default)]
    description: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    guid: Option<Text>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parsed feed: channel title plus entries in document order.
#[derive(Debug, Clone, Default)]
pub struct FeedDocument {
    pub title: String,
    pub entries: Vec<RawFeedEntry>,
}

/// Parse an Atom or RSS document. Entries without an id are skipped.
pub fn parse_feed(xml: &str) -> Result<FeedDocument> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let doc = if looks_like_atom(&xml_clean) {
        parse_atom(&xml_clean)?
    } else {
        parse_rss(&xml_clean)?
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_entries_total").increment(doc.entries.len() as u64);
    Ok(doc)
}

fn looks_like_atom(xml: &str) -> bool {
    let head: String = xml.chars().take(512).collect();
    head.contains("<feed")
}

fn parse_atom(xml: &str) -> Result<FeedDocument> {
    let feed: AtomFeed = from_str(xml).context("parsing atom feed xml")?;
    let mut out = Vec::with_capacity(feed.entries.len());
    for it in feed.entries {
        let id = it
            .video_id
            .filter(|v| !v.trim().is_empty())
            .or_else(|| it.id.as_deref().map(atom_id_to_video_id));
        let Some(id) = id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
            tracing::debug!("atom entry without id skipped");
            continue;
        };

        let link = it
            .links
            .iter()
            .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
            .and_then(|l| l.href.clone())
            .or_else(|| Some(format!("{WATCH_BASE}{id}")));

        let description = it
            .group
            .and_then(|g| g.description)
            .or(it.summary)
            .map(|t| t.value)
            .unwrap_or_default();

        out.push(RawFeedEntry {
            id,
            title: it.title.map(|t| t.value.trim().to_string()).unwrap_or_default(),
            published: it.published.or(it.updated).unwrap_or_default(),
            description,
            link,
        });
    }
    Ok(FeedDocument {
        title: feed.title.map(|t| t.value.trim().to_string()).unwrap_or_default(),
        entries: out,
    })
}

fn parse_rss(xml: &str) -> Result<FeedDocument> {
    let rss: Rss = from_str(xml).context("parsing rss xml")?;
    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        let id = it
            .guid
            .map(|g| g.value.trim().to_string())
            .filter(|g| !g.is_empty())
            .or_else(|| it.link.clone());
        let Some(id) = id else {
            tracing::debug!("rss item without guid/link skipped");
            continue;
        };
        out.push(RawFeedEntry {
            id,
            title: it.title.unwrap_or_default().trim().to_string(),
            published: it.pub_date.unwrap_or_default(),
            description: it.description.unwrap_or_default(),
            link: it.link,
        });
    }
    Ok(FeedDocument {
        title: rss.channel.title.unwrap_or_default(),
        entries: out,
    })
}

// "yt:video:abc123" -> "abc123"; other ids pass through.
fn atom_id_to_video_id(id: &str) -> String {
    id.rsplit_once("yt:video:")
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| id.to_string())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

// ------------------------------------------------------------
// Channel addressing
// ------------------------------------------------------------

pub fn channel_feed_url(channel_id: &str) -> String {
    format!("{CHANNEL_FEED_BASE}{channel_id}")
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_BASE}{video_id}")
}

/// Channel id straight from a `/channel/<id>` URL, without any request.
pub fn channel_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/channel/")?;
    let id = rest.split(['/', '?', '#']).next()?.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Find a channel id embedded in a channel page's HTML.
pub fn channel_id_from_html(html: &str) -> Option<String> {
    static PATTERNS: OnceCell<Vec<Regex>> = OnceCell::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r#""channelId":"(UC[a-zA-Z0-9_-]+)""#,
            r#""externalId":"(UC[a-zA-Z0-9_-]+)""#,
            r#"/channel/(UC[a-zA-Z0-9_-]+)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static channel id regex"))
        .collect()
    });
    patterns
        .iter()
        .find_map(|re| re.captures(html).map(|c| c[1].to_string()))
}

fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

// ------------------------------------------------------------
// HTTP fetcher
// ------------------------------------------------------------

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch_feed(&self, address: &str) -> Result<Vec<RawFeedEntry>> {
        let resp = self
            .client
            .get(address)
            .send()
            .await
            .with_context(|| format!("feed http get {address}"))?
            .error_for_status()
            .with_context(|| format!("feed http status {address}"))?;
        let body = resp.text().await.context("feed http .text()")?;
        Ok(parse_feed(&body)?.entries)
    }

    /// Any channel URL form (`/channel/`, `/@handle`, `/c/`, `/user/`) to a channel id.
    async fn resolve_channel_id(&self, channel_url: &str) -> Result<Option<String>> {
        let url = ensure_scheme(channel_url);
        if let Some(id) = channel_id_from_url(&url) {
            return Ok(Some(id));
        }
        if !(url.contains("/@") || url.contains("/c/") || url.contains("/user/")) {
            return Ok(None);
        }

        tracing::info!(url = %url, "resolving channel id from page");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching channel page {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(url = %url, %status, "channel page request failed");
            return Ok(None);
        }
        let html = resp.text().await.context("reading channel page body")?;
        let id = channel_id_from_html(&html);
        if id.is_none() {
            tracing::warn!(url = %url, "no channel id found on page");
        }
        Ok(id)
    }
}
