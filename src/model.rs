// src/model.rs
//! Domain records shared by the tracker, extractors, store and notifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Video channel (or any feed) with a stable external identifier.
    Feed { external_id: String },
    /// Plain web page compared by content fingerprint.
    Page,
}

/// A monitored origin. `last_seen` is the last entry id for feeds and the
/// last content hash for pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(flatten)]
    pub kind: SourceKind,
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

impl Source {
    pub fn feed(name: impl Into<String>, external_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Feed {
                external_id: external_id.into(),
            },
            address: address.into(),
            description: String::new(),
            last_seen: None,
            last_check: None,
            last_update: None,
        }
    }

    pub fn page(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Page,
            address: url.into(),
            description: String::new(),
            last_seen: None,
            last_check: None,
            last_update: None,
        }
    }

    /// Store key: external id for feeds, the URL for pages.
    pub fn id(&self) -> &str {
        match &self.kind {
            SourceKind::Feed { external_id } => external_id,
            SourceKind::Page => &self.address,
        }
    }

    pub fn is_feed(&self) -> bool {
        matches!(self.kind, SourceKind::Feed { .. })
    }

    /// Record a check that found nothing new.
    pub fn mark_checked(&mut self, now: DateTime<Utc>) {
        self.last_check = Some(now);
    }

    /// Record a confirmed new item.
    pub fn mark_updated(&mut self, seen: impl Into<String>, now: DateTime<Utc>) {
        self.last_seen = Some(seen.into());
        self.last_update = Some(now);
        self.last_check = Some(now);
    }
}

/// One item as it comes out of a feed, before any extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeedEntry {
    pub id: String,
    pub title: String,
    /// Raw timestamp text; RFC 3339 (Atom) or RFC 2822 (RSS).
    pub published: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: Option<String>,
}

impl RawFeedEntry {
    /// Lenient timestamp parse. `None` means "not newer than anything".
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.published)
    }
}

/// Accepts RFC 3339 first, then RFC 2822.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub title: String,
    pub href: String,
}

/// Extracted page content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub title: String,
    pub body: String,
    pub links: Vec<Link>,
}

/// A captured unit of content. Never updated once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Feed item id, or content hash for page revisions.
    pub id: String,
    pub source_name: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub link: Option<String>,
    /// Transcript or page text fed to the summarizer.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub outline: String,
    pub captured_at: DateTime<Utc>,
}

/// Finished record handed to notifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub source_name: String,
    pub source_address: String,
    pub entry: Entry,
    pub links: Vec<Link>,
}
