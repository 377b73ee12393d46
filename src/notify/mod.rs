// src/notify/mod.rs
//! Notification sinks for finished updates.

pub mod email;
pub mod format;
pub mod report;
pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::MonitorConfig;
use crate::model::Update;

pub use email::EmailNotifier;
pub use format::{format_markdown, preview, subject, DEFAULT_MAX_BYTES};
pub use report::FileReportNotifier;
pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one batch. An empty batch is a no-op.
    async fn deliver(&self, updates: &[Update]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes each update to the log. Always configured, so a run without any
/// delivery channel still leaves a trace.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, updates: &[Update]) -> Result<()> {
        for u in updates {
            tracing::info!(
                source = %u.source_name,
                title = %u.entry.title,
                link = u.entry.link.as_deref().unwrap_or(&u.source_address),
                summary_len = u.entry.summary.len(),
                "update"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fan-out to every configured sink. Individual failures are logged, never
/// propagated.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn from_config(cfg: &MonitorConfig) -> Self {
        let mut sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];

        if cfg.report.enabled {
            sinks.push(Arc::new(FileReportNotifier::from_config(&cfg.report)));
        }
        if cfg.webhook.enabled {
            match WebhookNotifier::from_config(&cfg.webhook) {
                Ok(n) => sinks.push(Arc::new(n)),
                Err(e) => tracing::warn!("webhook notifier disabled: {e:#}"),
            }
        }
        if cfg.email.enabled {
            match EmailNotifier::from_config(&cfg.email) {
                Ok(n) => sinks.push(Arc::new(n)),
                Err(e) => tracing::warn!("email notifier disabled: {e:#}"),
            }
        }

        let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
        tracing::info!(?names, "notifiers configured");
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the number of sinks that accepted the batch.
    pub async fn deliver_all(&self, updates: &[Update]) -> usize {
        if updates.is_empty() {
            return 0;
        }
        let mut ok = 0;
        for sink in &self.sinks {
            match sink.deliver(updates).await {
                Ok(()) => ok += 1,
                Err(e) => tracing::warn!(notifier = sink.name(), "delivery failed: {e:#}"),
            }
        }
        ok
    }
}
