// src/notify/email.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{format_markdown, subject, Notifier, DEFAULT_MAX_BYTES};
use crate::config::EmailConfig;
use crate::model::Update;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn required<'a>(v: &'a Option<String>, what: &str) -> Result<&'a str> {
    v.as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("email enabled but {what} missing"))
}

impl EmailNotifier {
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let host = required(&cfg.smtp_host, "smtp_host")?;
        let user = required(&cfg.username, "username")?;
        let pass = required(&cfg.password, "password")?;
        let from: Mailbox = required(&cfg.from, "from")?
            .parse()
            .context("invalid email from address")?;
        let to: Mailbox = required(&cfg.to, "to")?
            .parse()
            .context("invalid email to address")?;

        let creds = Credentials::new(user.to_string(), pass.to_string());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("invalid smtp host")?
            .port(cfg.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn deliver(&self, updates: &[Update]) -> Result<()> {
        // mail has no practical size cap, but keep digests readable
        let Some(body) = format_markdown("Content updates", updates, DEFAULT_MAX_BYTES * 4) else {
            return Ok(());
        };

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject(updates))
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
