// src/page.rs
//! Page fetching and main-content extraction for page sources.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::model::{Link, PageSnapshot};

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const NO_TITLE: &str = "(untitled)";

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch and extract a page. Any error means "no usable snapshot this cycle".
    async fn fetch_page(&self, url: &str) -> Result<PageSnapshot>;
}

/// Site-specific selectors, tried before the generic content containers.
struct SiteRule {
    host_suffix: &'static str,
    title: &'static [&'static str],
    body: &'static [&'static str],
}

const SITE_RULES: &[SiteRule] = &[
    SiteRule {
        host_suffix: "substack.com",
        title: &["h1.post-title", "h1"],
        body: &["div.available-content", "div.body"],
    },
    SiteRule {
        host_suffix: "paulgraham.com",
        title: &["title"],
        body: &["body"],
    },
    SiteRule {
        host_suffix: "bloomberg.com",
        title: &["h1", "title"],
        body: &["div.body-content", "article"],
    },
    SiteRule {
        host_suffix: "wsj.com",
        title: &["h1", "title"],
        body: &["div.article-content", "article"],
    },
];

const GENERIC_TITLE: &[&str] = &["h1", "title"];
const GENERIC_BODY: &[&str] = &[
    "article",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-body",
    ".post-body",
    "main",
    ".main-content",
];

fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        doc.select(&sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    let raw: Vec<&str> = el.text().map(str::trim).filter(|t| !t.is_empty()).collect();
    raw.join(" ")
}

/// Extract title, main text and absolute outbound links from raw HTML.
pub fn extract_snapshot(html: &str, page_url: &str) -> PageSnapshot {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let host = base
        .as_ref()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let rule = SITE_RULES.iter().find(|r| host.ends_with(r.host_suffix));
    let (title_sel, body_sel) = match rule {
        Some(r) => (r.title, r.body),
        None => (GENERIC_TITLE, GENERIC_BODY),
    };

    let title = first_text(&doc, title_sel).unwrap_or_else(|| NO_TITLE.to_string());
    let body = first_text(&doc, body_sel)
        .or_else(|| first_text(&doc, &["body"]))
        .unwrap_or_default();

    PageSnapshot {
        title,
        body,
        links: extract_links(&doc, base.as_ref()),
    }
}

fn extract_links(doc: &Html, base: Option<&Url>) -> Vec<Link> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            let abs = if href.starts_with("http://") || href.starts_with("https://") {
                href.to_string()
            } else if href.starts_with('/') {
                base?.join(href).ok()?.to_string()
            } else {
                return None;
            };
            Some(Link {
                title: element_text(a),
                href: abs,
            })
        })
        .collect()
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_UA)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("building page http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<PageSnapshot> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("page http get {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {status} for {url}");
        }
        let html = resp.text().await.context("reading page body")?;
        Ok(extract_snapshot(&html, url))
    }
}
