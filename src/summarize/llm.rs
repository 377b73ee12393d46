// src/summarize/llm.rs
//! Chat-completion capability used by the summarizer.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One request/response round trip. Returns the trimmed assistant text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;

    /// False when the model cannot be called at all (no key configured).
    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiCompatible {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatible {
    pub fn new(cfg: &LlmConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("llm api key missing"))?;
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("content-monitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)));
        if let Some(proxy) = cfg.proxy.as_deref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("invalid llm proxy")?);
        }
        Ok(Self {
            http: builder.build().context("building llm http client")?,
            endpoint: format!("{}/chat/completions", cfg.base_url.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

/// First choice's text. A reply without usable text is an error so callers
/// fall back to their failure path.
fn extract_content(resp: Resp) -> Result<String> {
    let content = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        bail!("llm returned no content");
    }
    Ok(content)
}

#[async_trait]
impl ChatModel for OpenAiCompatible {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("llm request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            bail!("llm returned HTTP {status}: {snippet}");
        }
        let body: Resp = resp.json().await.context("decoding llm response")?;
        extract_content(body)
    }

    fn name(&self) -> &'static str {
        "openai-compatible"
    }
}

/// Used when no key is configured. Never called by the summarizer.
pub struct DisabledModel;

#[async_trait]
impl ChatModel for DisabledModel {
    async fn complete(&self, _: &str, _: &str, _: u32, _: f32) -> Result<String> {
        bail!("language model disabled")
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
