// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{NotificationEvent, Notifier};

pub const DEFAULT_FROM: &str = "noreply@medicinalplants.site";

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// SMTP relay from `SMTP_HOST` / `SMTP_USER` / `SMTP_PASS`, sender from
    /// `NOTIFY_EMAIL_FROM` (optional), recipient from the schedule state.
    pub fn from_env(to_addr: &str) -> Result<Self> {
        let var = |k: &str| std::env::var(k).with_context(|| format!("{k} missing"));
        let host = var("SMTP_HOST")?;
        let user = var("SMTP_USER")?;
        let pass = var("SMTP_PASS")?;
        let from_addr =
            std::env::var("NOTIFY_EMAIL_FROM").unwrap_or_else(|_| DEFAULT_FROM.to_string());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(Credentials::new(user, pass))
            .build();

        Ok(Self {
            mailer,
            from: from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?,
            to: to_addr.trim().parse().context("invalid notification recipient")?,
        })
    }
}

pub fn subject_for(ev: &NotificationEvent) -> String {
    format!("MAP Terminal - Scraping {}", ev.kind.title())
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        let msg = Message::builder()
            .from(self.from.clone())
            .reply_to(self.from.clone())
            .to(self.to.clone())
            .subject(subject_for(ev))
            .header(header::ContentType::TEXT_PLAIN)
            .body(ev.summary.clone())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
