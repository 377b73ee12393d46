// src/monitor.rs
//! One check cycle over every configured source.
//!
//! Sources are processed one after another. Any failure inside a source is
//! logged and counted, and the cycle moves on to the next source. Whatever
//! happens, the source's `last_check` advances and the source is saved.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, gauge, histogram};

use crate::captions::CaptionPipeline;
use crate::config::{CycleConfig, MonitorConfig};
use crate::feed::{channel_feed_url, FeedFetcher};
use crate::fingerprint::fingerprint_snapshot;
use crate::metrics::ensure_metrics_described;
use crate::model::{Entry, RawFeedEntry, Source, Update};
use crate::notify::NotifierMux;
use crate::pacing::Pacer;
use crate::page::PageFetcher;
use crate::store::StateStore;
use crate::summarize::ChunkedSummarizer;
use crate::tracker::Tracker;

/// Delays applied inside a cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleTiming {
    pub source_spacing: Duration,
    pub item_spacing: Duration,
    pub caption_delay: Duration,
    pub caption_retry_delay: Duration,
}

impl CycleTiming {
    pub fn from_config(c: &CycleConfig) -> Self {
        Self {
            source_spacing: Duration::from_secs(c.source_spacing_secs),
            item_spacing: Duration::from_secs(c.item_spacing_secs),
            caption_delay: Duration::from_secs(c.caption_delay_secs),
            caption_retry_delay: Duration::from_secs(c.caption_retry_delay_secs),
        }
    }

    pub fn none() -> Self {
        Self {
            source_spacing: Duration::ZERO,
            item_spacing: Duration::ZERO,
            caption_delay: Duration::ZERO,
            caption_retry_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub checked: usize,
    pub errors: usize,
    pub updates: Vec<Update>,
    /// Sinks that accepted the batch.
    pub delivered: usize,
}

pub struct Monitor {
    store: Arc<dyn StateStore>,
    feeds: Arc<dyn FeedFetcher>,
    pages: Arc<dyn PageFetcher>,
    captions: Arc<CaptionPipeline>,
    summarizer: Arc<ChunkedSummarizer>,
    notifiers: NotifierMux,
    tracker: Tracker,
    timing: CycleTiming,
    languages: Vec<String>,
    source_pacer: Pacer,
    item_pacer: Pacer,
}

pub struct MonitorParts {
    pub store: Arc<dyn StateStore>,
    pub feeds: Arc<dyn FeedFetcher>,
    pub pages: Arc<dyn PageFetcher>,
    pub captions: Arc<CaptionPipeline>,
    pub summarizer: Arc<ChunkedSummarizer>,
    pub notifiers: NotifierMux,
}

impl Monitor {
    pub fn new(parts: MonitorParts, tracker: Tracker, timing: CycleTiming) -> Self {
        ensure_metrics_described();
        let languages = parts.captions.config().languages.clone();
        Self {
            store: parts.store,
            feeds: parts.feeds,
            pages: parts.pages,
            captions: parts.captions,
            summarizer: parts.summarizer,
            notifiers: parts.notifiers,
            tracker,
            source_pacer: Pacer::new(timing.source_spacing),
            item_pacer: Pacer::new(timing.item_spacing),
            timing,
            languages,
        }
    }

    /// Check every source once, then hand the collected updates to the notifiers.
    pub async fn run_cycle(&self, sources: &[Source]) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();
        self.source_pacer.reset().await;

        for configured in sources {
            self.source_pacer.wait().await;
            report.checked += 1;
            counter!("monitor_sources_checked_total").increment(1);

            let before = report.updates.len();
            if let Err(e) = self.check_source(configured, &mut report.updates).await {
                report.errors += 1;
                counter!("monitor_source_errors_total").increment(1);
                tracing::warn!(source = %configured.name, "source check failed: {e:#}");
            }
            let found = report.updates.len() - before;
            if found > 0 {
                tracing::info!(source = %configured.name, found, "new content");
            } else {
                tracing::debug!(source = %configured.name, "no new content");
            }
        }

        if report.updates.is_empty() {
            tracing::info!(checked = report.checked, errors = report.errors, "cycle finished, nothing new");
        } else {
            tracing::info!(
                checked = report.checked,
                errors = report.errors,
                updates = report.updates.len(),
                "cycle finished, notifying"
            );
            report.delivered = self.notifiers.deliver_all(&report.updates).await;
        }

        histogram!("monitor_cycle_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        gauge!("monitor_last_cycle_ts").set(Utc::now().timestamp() as f64);
        report
    }

    /// Load persisted state for `configured`, check it, and always save it back.
    async fn check_source(&self, configured: &Source, out: &mut Vec<Update>) -> Result<()> {
        let mut source = self.merged(configured).await?;

        let outcome = if source.is_feed() {
            self.check_feed_source(&mut source, out).await
        } else {
            self.check_page_source(&mut source, out).await
        };

        // last_check advances even when the check failed
        source.mark_checked(Utc::now());
        let saved = self
            .store
            .save_source(&source)
            .await
            .with_context(|| format!("saving source {}", source.name));

        match (outcome, saved) {
            (Err(e), Err(save_err)) => {
                tracing::warn!(source = %source.name, "{save_err:#}");
                Err(e)
            }
            (outcome, saved) => outcome.and(saved),
        }
    }

    /// Configured identity and address, persisted progress fields.
    async fn merged(&self, configured: &Source) -> Result<Source> {
        let mut source = configured.clone();
        if let Some(stored) = self
            .store
            .get_source(&configured.name)
            .await
            .with_context(|| format!("loading source {}", configured.name))?
        {
            source.last_seen = stored.last_seen;
            source.last_check = stored.last_check;
            source.last_update = stored.last_update;
        }
        Ok(source)
    }

    pub async fn check_feed_source(&self, source: &mut Source, out: &mut Vec<Update>) -> Result<()> {
        let entries = self
            .feeds
            .fetch_feed(&source.address)
            .await
            .with_context(|| format!("fetching feed for {}", source.name))?;
        if entries.is_empty() {
            tracing::info!(source = %source.name, "feed has no entries");
            return Ok(());
        }

        let selected = self.tracker.select(&entries, source, self.store.as_ref()).await?;
        if selected.is_empty() {
            return Ok(());
        }
        tracing::info!(source = %source.name, selected = selected.len(), "feed entries to process");

        self.item_pacer.reset().await;
        for raw in selected {
            self.item_pacer.wait().await;
            let entry = self.process_feed_entry(source, &raw).await;
            // state-store failure aborts the rest of this source
            self.store
                .save_entry(&entry)
                .await
                .with_context(|| format!("saving entry {}", entry.id))?;
            counter!("monitor_new_entries_total").increment(1);
            source.mark_updated(entry.id.clone(), Utc::now());
            out.push(Update {
                source_name: source.name.clone(),
                source_address: source.address.clone(),
                entry,
                links: Vec::new(),
            });
        }
        Ok(())
    }

    async fn process_feed_entry(&self, source: &Source, raw: &RawFeedEntry) -> Entry {
        let text = self.captions_with_retry(&raw.id, &raw.title).await;
        let summary = self.summarizer.summarize(&raw.title, &text).await;
        Entry {
            id: raw.id.clone(),
            source_name: source.name.clone(),
            title: raw.title.clone(),
            body: raw.description.clone(),
            published_at: raw.published_at(),
            link: raw.link.clone(),
            text,
            summary: summary.summary,
            outline: summary.outline,
            captured_at: Utc::now(),
        }
    }

    async fn captions_with_retry(&self, video_id: &str, title: &str) -> String {
        if !self.captions.config().enabled {
            return String::new();
        }
        tokio::time::sleep(self.timing.caption_delay).await;
        let text = self.captions.extract(video_id, &self.languages).await;
        if !text.is_empty() {
            return text;
        }
        tracing::info!(
            video_id = %video_id,
            title = %title,
            delay_secs = self.timing.caption_retry_delay.as_secs(),
            "caption extraction came back empty, retrying once"
        );
        tokio::time::sleep(self.timing.caption_retry_delay).await;
        self.captions.extract(video_id, &self.languages).await
    }

    pub async fn check_page_source(&self, source: &mut Source, out: &mut Vec<Update>) -> Result<()> {
        let snap = self
            .pages
            .fetch_page(&source.address)
            .await
            .with_context(|| format!("fetching page for {}", source.name))?;

        let Some(hash) = fingerprint_snapshot(&snap) else {
            tracing::warn!(source = %source.name, "page extraction was empty, keeping previous hash");
            return Ok(());
        };
        if source.last_seen.as_deref() == Some(hash.as_str()) {
            return Ok(());
        }

        let summary = self.summarizer.summarize(&snap.title, &snap.body).await;
        let entry = Entry {
            id: format!("{}#{}", source.address, hash),
            source_name: source.name.clone(),
            title: snap.title.clone(),
            body: snap.body.clone(),
            published_at: None,
            link: Some(source.address.clone()),
            text: snap.body,
            summary: summary.summary,
            outline: summary.outline,
            captured_at: Utc::now(),
        };
        self.store
            .save_entry(&entry)
            .await
            .with_context(|| format!("saving page revision for {}", source.name))?;
        counter!("monitor_new_entries_total").increment(1);
        source.mark_updated(hash, Utc::now());
        out.push(Update {
            source_name: source.name.clone(),
            source_address: source.address.clone(),
            entry,
            links: snap.links,
        });
        Ok(())
    }
}

/// Turn configured channels and pages into sources. Channels configured by
/// URL only are resolved to an id; unresolvable ones are skipped.
pub async fn resolve_sources(cfg: &MonitorConfig, feeds: &dyn FeedFetcher) -> Vec<Source> {
    let mut out = Vec::with_capacity(cfg.channels.len() + cfg.pages.len());

    for ch in &cfg.channels {
        let id = match (&ch.channel_id, &ch.channel_url) {
            (Some(id), _) if !id.trim().is_empty() => Some(id.trim().to_string()),
            (_, Some(url)) => match feeds.resolve_channel_id(url).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(channel = %ch.name, "channel id lookup failed: {e:#}");
                    None
                }
            },
            _ => None,
        };
        let Some(id) = id else {
            tracing::error!(channel = %ch.name, "could not determine channel id, skipping");
            continue;
        };
        let mut src = Source::feed(&ch.name, &id, channel_feed_url(&id));
        src.description = ch.description.clone();
        out.push(src);
    }

    for p in &cfg.pages {
        let mut src = Source::page(&p.name, p.url.trim());
        src.description = p.description.clone();
        out.push(src);
    }
    out
}
