// src/config.rs
//! Monitor configuration: TOML file plus environment overrides.
//!
//! Lookup order for the file:
//! 1) $MONITOR_CONFIG_PATH
//! 2) config/monitor.toml
//! 3) built-in defaults
//!
//! Environment overrides are applied through a lookup function so tests can
//! feed them without touching the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub monitor: CycleConfig,
    pub tracker: TrackerConfig,
    pub captions: CaptionConfig,
    pub summarizer: SummarizerConfig,
    pub llm: LlmConfig,
    pub webhook: WebhookConfig,
    pub email: EmailConfig,
    pub report: ReportConfig,
    pub channels: Vec<ChannelConfig>,
    pub pages: Vec<PageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub interval_secs: u64,
    /// Minimum spacing between two sources on the same origin.
    pub source_spacing_secs: u64,
    /// Minimum spacing between two items of the same source.
    pub item_spacing_secs: u64,
    /// Pause before each caption extraction.
    pub caption_delay_secs: u64,
    /// Pause before the single whole-extraction retry.
    pub caption_retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub state_dir: PathBuf,
    pub metrics_addr: Option<String>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 6 * 3600,
            source_spacing_secs: 5,
            item_spacing_secs: 5,
            caption_delay_secs: 5,
            caption_retry_delay_secs: 10,
            request_timeout_secs: 30,
            state_dir: PathBuf::from("state"),
            metrics_addr: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_new_per_cycle: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_new_per_cycle: crate::tracker::DEFAULT_MAX_NEW_PER_CYCLE,
        }
    }
}

/// Which shape of the transcript fallback service to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptApi {
    #[default]
    Json3,
    Xml,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub enabled: bool,
    pub languages: Vec<String>,
    pub prefer_manual: bool,
    pub allow_auto: bool,
    pub max_retries: u32,
    pub retry_wait_secs: u64,
    pub request_timeout_secs: u64,
    pub ytdlp_path: String,
    pub ytdlp_timeout_secs: u64,
    pub cookie_file: Option<PathBuf>,
    pub proxy: Option<String>,
    pub transcript_api: TranscriptApi,
    /// Preferred languages for the fallback service; defaults to `languages`.
    pub transcript_languages: Vec<String>,
    pub translate_to: Option<String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: vec!["zh".into(), "en".into()],
            prefer_manual: true,
            allow_auto: true,
            max_retries: 3,
            retry_wait_secs: 5,
            request_timeout_secs: 30,
            ytdlp_path: "yt-dlp".into(),
            ytdlp_timeout_secs: 60,
            cookie_file: None,
            proxy: None,
            transcript_api: TranscriptApi::Json3,
            transcript_languages: Vec::new(),
            translate_to: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub enable_chunking: bool,
    pub chunk_char_limit: usize,
    pub chunk_overlap: usize,
    pub max_chunks: usize,
    pub chunk_summary_max_tokens: u32,
    pub final_summary_max_tokens: u32,
    pub temperature: f32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enable_chunking: true,
            chunk_char_limit: 5000,
            chunk_overlap: 400,
            max_chunks: 6,
            chunk_summary_max_tokens: 600,
            final_summary_max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.deepseek.com".into(),
            model: "deepseek-chat".into(),
            timeout_secs: 120,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub secret: Option<String>,
    pub at_all: bool,
    pub at_mobiles: Vec<String>,
    pub max_bytes: usize,
    pub timeout_secs: u64,
    pub max_retries: u8,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            secret: None,
            at_all: false,
            at_mobiles: Vec::new(),
            max_bytes: crate::notify::DEFAULT_MAX_BYTES,
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: 587,
            username: None,
            password: None,
            from: None,
            to: None,
        }
    }
}

/// Plain-text report files written next to the other sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub preview_chars: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("reports"),
            preview_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub name: String,
    pub url: String,
    pub description: String,
}

impl MonitorConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading monitor config from {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut cfg: MonitorConfig = toml::from_str(s).context("parsing monitor config toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// File from env/fallback path (or defaults), then process env overrides.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                tracing::info!("no config file found, using defaults");
                Self::default()
            }
        };
        cfg.apply_env_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("LLM_API_KEY")
            .or_else(|| get("OPENAI_API_KEY"))
            .or_else(|| get("DEEPSEEK_API_KEY"))
        {
            self.llm.api_key = Some(key);
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }

        if let Some(v) = get("WEBHOOK_URL") {
            self.webhook.url = Some(v);
            self.webhook.enabled = true;
        }
        if let Some(v) = get("WEBHOOK_SECRET") {
            self.webhook.secret = Some(v);
        }

        if let Some(v) = get("SMTP_HOST") {
            self.email.smtp_host = Some(v);
        }
        if let Some(v) = get("SMTP_USER") {
            self.email.username = Some(v);
        }
        if let Some(v) = get("SMTP_PASS") {
            self.email.password = Some(v);
        }
        if let Some(v) = get("NOTIFY_EMAIL_FROM") {
            self.email.from = Some(v);
        }
        if let Some(v) = get("NOTIFY_EMAIL_TO") {
            self.email.to = Some(v);
        }

        if let Some(v) = get("REPORT_DIR") {
            self.report.dir = PathBuf::from(v);
            self.report.enabled = true;
        }

        if let Some(v) = get("CHECK_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.monitor.interval_secs = v;
        }
        if let Some(v) = get("STATE_DIR") {
            self.monitor.state_dir = PathBuf::from(v);
        }
        if let Some(v) = get("METRICS_ADDR") {
            self.monitor.metrics_addr = Some(v);
        }
        self.sanitize();
    }

    /// Clamp values into ranges the pipeline can work with.
    pub fn sanitize(&mut self) {
        let s = &mut self.summarizer;
        s.chunk_char_limit = s.chunk_char_limit.max(1000);
        s.chunk_overlap = s.chunk_overlap.min(s.chunk_char_limit / 2);
        s.max_chunks = s.max_chunks.max(1);
        if !(0.0..=2.0).contains(&s.temperature) {
            s.temperature = SummarizerConfig::default().temperature;
        }

        let c = &mut self.captions;
        c.max_retries = c.max_retries.max(1);
        c.request_timeout_secs = c.request_timeout_secs.max(1);
        if c.transcript_languages.is_empty() {
            c.transcript_languages = c.languages.clone();
        }

        self.tracker.max_new_per_cycle = self.tracker.max_new_per_cycle.max(1);
        self.monitor.interval_secs = self.monitor.interval_secs.max(1);

        self.channels.retain(|ch| {
            let keep = ch.channel_id.is_some() || ch.channel_url.is_some();
            if !keep {
                tracing::info!(channel = %ch.name, "skipping channel without id or url");
            }
            keep
        });
        self.pages.retain(|p| !p.url.trim().is_empty());
    }

    pub fn llm_enabled(&self) -> bool {
        self.llm
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}
