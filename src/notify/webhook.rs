// src/notify/webhook.rs
//! Signed markdown webhook (robot-style chat endpoints).
//!
//! When a secret is configured every request carries `timestamp` and `sign`
//! query parameters, where `sign` is base64(HMAC-SHA256(secret,
//! "{timestamp_ms}\n{secret}")).

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use url::Url;

use super::{format_markdown, Notifier};
use crate::config::WebhookConfig;
use crate::model::Update;

type HmacSha256 = Hmac<Sha256>;

pub const MESSAGE_TITLE: &str = "Content updates";

pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| anyhow!("hmac key: {e}"))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Append `timestamp` and `sign` to the webhook URL (values URL-encoded).
pub fn signed_url(webhook: &str, secret: Option<&str>, timestamp_ms: i64) -> Result<String> {
    let mut url = Url::parse(webhook).context("invalid webhook url")?;
    if let Some(secret) = secret.filter(|s| !s.is_empty()) {
        let signature = sign(secret, timestamp_ms)?;
        url.query_pairs_mut()
            .append_pair("timestamp", &timestamp_ms.to_string())
            .append_pair("sign", &signature);
    }
    Ok(url.to_string())
}

#[derive(Serialize)]
struct Markdown<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct At<'a> {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_at_all: bool,
    #[serde(skip_serializing_if = "no_mobiles")]
    at_mobiles: &'a [String],
}

fn no_mobiles(v: &&[String]) -> bool {
    v.is_empty()
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    msgtype: &'static str,
    markdown: Markdown<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    at: Option<At<'a>>,
}

#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    secret: Option<String>,
    at_all: bool,
    at_mobiles: Vec<String>,
    max_bytes: usize,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn from_config(cfg: &WebhookConfig) -> Result<Self> {
        let url = cfg
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| anyhow!("webhook enabled but no url configured"))?;
        Url::parse(&url).context("invalid webhook url")?;
        Ok(Self {
            url,
            secret: cfg.secret.clone(),
            at_all: cfg.at_all,
            at_mobiles: cfg.at_mobiles.clone(),
            max_bytes: cfg.max_bytes,
            client: Client::new(),
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
            max_retries: cfg.max_retries.max(1),
        })
    }

    async fn send_markdown(&self, text: &str) -> Result<()> {
        let at = (self.at_all || !self.at_mobiles.is_empty()).then(|| At {
            is_at_all: self.at_all,
            at_mobiles: &self.at_mobiles,
        });
        let payload = WebhookPayload {
            msgtype: "markdown",
            markdown: Markdown {
                title: MESSAGE_TITLE,
                text,
            },
            at,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            // the signature embeds a timestamp, so re-sign each attempt
            let url = signed_url(&self.url, self.secret.as_deref(), chrono::Utc::now().timestamp_millis())?;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(rsp) => {
                        let body: serde_json::Value = rsp.json().await.unwrap_or_default();
                        let code = body.get("errcode").and_then(|c| c.as_i64()).unwrap_or(0);
                        if code != 0 {
                            let msg = body.get("errmsg").and_then(|m| m.as_str()).unwrap_or("");
                            // rejected payloads do not improve on retry
                            bail!("webhook rejected message: errcode {code} {msg}");
                        }
                        return Ok(());
                    }
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };

            if attempt < self.max_retries {
                tracing::warn!(attempt, error = %err, "webhook delivery failed, retrying");
                tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                continue;
            }
            return Err(err);
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, updates: &[Update]) -> Result<()> {
        let Some(text) = format_markdown(MESSAGE_TITLE, updates, self.max_bytes) else {
            return Ok(());
        };
        self.send_markdown(&text).await
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
