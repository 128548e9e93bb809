// src/notify/webhook.rs
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{NotificationEvent, Notifier};

#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    message: &'a str,
    data: &'a serde_json::Value,
    timestamp: i64,
}

impl<'a> WebhookPayload<'a> {
    fn of(ev: &'a NotificationEvent) -> Self {
        Self {
            kind: ev.kind.as_str(),
            message: &ev.summary,
            data: &ev.data,
            timestamp: ev.ts.timestamp(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        let payload = WebhookPayload::of(ev);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EventKind;
    use chrono::{TimeZone, Utc};

    #[test]
    fn payload_shape() {
        let ev = NotificationEvent {
            kind: EventKind::Failure,
            summary: "MAP Terminal Scraping Failed".into(),
            data: serde_json::json!({"error": "x"}),
            ts: Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap(),
        };
        let v = serde_json::to_value(WebhookPayload::of(&ev)).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "type": "failure",
                "message": "MAP Terminal Scraping Failed",
                "data": {"error": "x"},
                "timestamp": 1_757_149_200i64
            })
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors_after_retries() {
        let n = WebhookNotifier::new("http://127.0.0.1:9/hook".into())
            .with_timeout(1)
            .with_retries(1);
        let ev = NotificationEvent::scheduler_error("x", Utc::now());
        assert!(n.send(&ev).await.is_err());
    }
}
