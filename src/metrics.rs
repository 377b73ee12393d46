// src/metrics.rs
use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_sources_checked_total", "Sources checked, all kinds.");
        describe_counter!(
            "monitor_source_errors_total",
            "Source checks that ended in an error and were skipped."
        );
        describe_counter!("monitor_new_entries_total", "Entries captured and stored.");
        describe_counter!("caption_attempts_total", "Caption download attempts.");
        describe_counter!(
            "caption_blocked_total",
            "Caption downloads answered with an anti-automation page."
        );
        describe_counter!(
            "caption_empty_total",
            "Videos for which no caption text could be retrieved."
        );
        describe_counter!("summarizer_calls_total", "Language model requests issued.");
        describe_counter!("feed_entries_total", "Entries parsed from fetched feeds.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_histogram!("monitor_cycle_ms", "Wall time of one check cycle in milliseconds.");
        describe_gauge!("monitor_last_cycle_ts", "Unix ts when the last check cycle finished.");
    });
}

/// Install the Prometheus recorder with its own scrape listener on `addr`.
pub fn install_exporter(addr: &str) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics address {addr}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    ensure_metrics_described();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
