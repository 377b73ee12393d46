//! content-monitor binary entrypoint.
//! Loads configuration, wires the pipeline, and runs check cycles on an interval
//! until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use content_monitor::feed::HttpFeedFetcher;
use content_monitor::monitor::resolve_sources;
use content_monitor::page::HttpPageFetcher;
use content_monitor::{
    CaptionPipeline, ChunkedSummarizer, CycleTiming, JsonFileStore, Monitor, MonitorConfig,
    MonitorParts, NotifierMux, Tracker,
};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("content_monitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = MonitorConfig::load_default().context("loading configuration")?;
    if let Some(addr) = cfg.monitor.metrics_addr.as_deref() {
        content_monitor::metrics::install_exporter(addr)?;
    }

    let once = std::env::args().any(|a| a == "--once");
    let request_timeout = Duration::from_secs(cfg.monitor.request_timeout_secs.max(1));

    let feeds = Arc::new(HttpFeedFetcher::new(request_timeout)?);
    let sources = resolve_sources(&cfg, feeds.as_ref()).await;
    if sources.is_empty() {
        tracing::warn!("no channels or pages configured, nothing to monitor");
    }

    let parts = MonitorParts {
        store: Arc::new(JsonFileStore::open(&cfg.monitor.state_dir).await?),
        feeds,
        pages: Arc::new(HttpPageFetcher::new(request_timeout)?),
        captions: Arc::new(CaptionPipeline::from_config(&cfg.captions)?),
        summarizer: Arc::new(ChunkedSummarizer::from_config(&cfg.llm, cfg.summarizer.clone())?),
        notifiers: NotifierMux::from_config(&cfg),
    };
    let monitor = Monitor::new(
        parts,
        Tracker::new(cfg.tracker.max_new_per_cycle),
        CycleTiming::from_config(&cfg.monitor),
    );

    tracing::info!(
        sources = sources.len(),
        interval_secs = cfg.monitor.interval_secs,
        llm = cfg.llm_enabled(),
        "content monitor started"
    );

    if once {
        monitor.run_cycle(&sources).await;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.monitor.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // created once so a Ctrl-C during a cycle is seen right after it
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.run_cycle(&sources).await;
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}
