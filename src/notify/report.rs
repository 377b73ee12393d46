// src/notify/report.rs
//! Plain-text report files, one per delivered batch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use super::format::{preview, MAX_RELATED_LINKS};
use super::Notifier;
use crate::config::ReportConfig;
use crate::model::Update;

const RULE_WIDTH: usize = 60;

pub struct FileReportNotifier {
    dir: PathBuf,
    preview_chars: usize,
}

impl FileReportNotifier {
    pub fn new(dir: impl Into<PathBuf>, preview_chars: usize) -> Self {
        Self {
            dir: dir.into(),
            preview_chars,
        }
    }

    pub fn from_config(cfg: &ReportConfig) -> Self {
        Self::new(cfg.dir.clone(), cfg.preview_chars)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `updates_<timestamp>.txt` and returns its path, or `None` for
    /// an empty batch.
    pub async fn write_report(&self, updates: &[Update]) -> Result<Option<PathBuf>> {
        if updates.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating report dir {}", self.dir.display()))?;
        let stamp = now.format("%Y%m%d_%H%M%S_%3f").to_string();
        let mut path = self.dir.join(format!("updates_{stamp}.txt"));
        let mut n = 1;
        // two batches in the same millisecond get a numeric suffix
        while fs::try_exists(&path).await.unwrap_or(false) {
            path = self.dir.join(format!("updates_{stamp}_{n}.txt"));
            n += 1;
        }
        fs::write(&path, render_report(updates, now, self.preview_chars))
            .await
            .with_context(|| format!("writing report {}", path.display()))?;
        tracing::info!(path = %path.display(), updates = updates.len(), "report written");
        Ok(Some(path))
    }
}

#[async_trait]
impl Notifier for FileReportNotifier {
    async fn deliver(&self, updates: &[Update]) -> Result<()> {
        self.write_report(updates).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "report"
    }
}

/// Report body: header, then one block per update separated by rules.
pub fn render_report(updates: &[Update], generated_at: DateTime<Utc>, preview_chars: usize) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = format!(
        "Update report - {}\n{rule}\n\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    for u in updates {
        let e = &u.entry;
        let when = e.published_at.unwrap_or(e.captured_at);
        out.push_str(&format!("Source: {}\n", u.source_name));
        out.push_str(&format!("Published: {}\n", when.format("%Y-%m-%d %H:%M:%S UTC")));
        out.push_str(&format!("Title: {}\n", e.title));
        out.push_str(&format!(
            "Link: {}\n\n",
            e.link.as_deref().unwrap_or(&u.source_address)
        ));
        if !e.summary.trim().is_empty() {
            out.push_str(&format!("Summary:\n{}\n\n", e.summary.trim()));
        }
        if !e.outline.trim().is_empty() {
            out.push_str(&format!("Outline:\n{}\n\n", e.outline.trim()));
        }
        if let Some(p) = preview(e, preview_chars) {
            out.push_str(&format!("Preview:\n{p}\n\n"));
        }
        if !u.links.is_empty() {
            out.push_str("Related links:\n");
            for l in u.links.iter().take(MAX_RELATED_LINKS) {
                let title = if l.title.trim().is_empty() { "link" } else { l.title.trim() };
                out.push_str(&format!("- {title}: {}\n", l.href));
            }
            out.push('\n');
        }
        out.push_str(&rule);
        out.push_str("\n\n");
    }
    out
}
