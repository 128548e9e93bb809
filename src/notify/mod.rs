// src/notify/mod.rs
//! Best-effort run notifications over email and webhook.
//!
//! Each channel is gated on its own flags: success events need `on_success`,
//! failure and error events need `on_failure`. Delivery errors are logged and
//! swallowed.

pub mod email;
pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::pipeline::RunResult;
use crate::scheduler::state::{ChannelConfig, NotificationConfig};

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Failure,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Error => "error",
        }
    }

    /// "Success", "Failure", "Error"
    pub fn title(self) -> &'static str {
        match self {
            EventKind::Success => "Success",
            EventKind::Failure => "Failure",
            EventKind::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub summary: String,
    pub data: serde_json::Value,
    pub ts: DateTime<Utc>,
}

impl NotificationEvent {
    /// Success or failure event describing a completed run.
    pub fn from_run(result: &RunResult, ts: DateTime<Utc>) -> Self {
        let stamp = stamp(ts);
        let (kind, summary) = if result.success {
            (
                EventKind::Success,
                format!(
                    "MAP Terminal Scraping Success\n\nTime: {stamp}\nItems Collected: {}\nExecution Time: {}s\nAverage Relevance: {}",
                    result.items_count,
                    result.execution_time,
                    (result.average_relevance() * 1000.0).round() / 1000.0
                ),
            )
        } else {
            (
                EventKind::Failure,
                format!(
                    "MAP Terminal Scraping Failed\n\nTime: {stamp}\nError: {}\nExecution Time: {}s",
                    result.error.as_deref().unwrap_or("unknown error"),
                    result.execution_time
                ),
            )
        };
        Self {
            kind,
            summary,
            data: serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
            ts,
        }
    }

    /// Scheduler-level problem (lock or state storage).
    pub fn scheduler_error(error: &str, ts: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Error,
            summary: format!(
                "MAP Terminal Scheduler Error\n\nTime: {}\nError: {error}",
                stamp(ts)
            ),
            data: serde_json::json!({ "error": error }),
            ts,
        }
    }
}

fn stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;
    async fn send(&self, ev: &NotificationEvent) -> Result<()>;
}

/// Which event kinds a channel wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelGate {
    pub on_success: bool,
    pub on_failure: bool,
}

impl ChannelGate {
    pub fn admits(self, kind: EventKind) -> bool {
        match kind {
            EventKind::Success => self.on_success,
            EventKind::Failure | EventKind::Error => self.on_failure,
        }
    }
}

impl From<&ChannelConfig> for ChannelGate {
    fn from(c: &ChannelConfig) -> Self {
        Self {
            on_success: c.on_success,
            on_failure: c.on_failure,
        }
    }
}

#[derive(Default, Clone)]
pub struct NotifierMux {
    routes: Vec<(ChannelGate, Arc<dyn Notifier>)>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gate: ChannelGate, notifier: Arc<dyn Notifier>) -> Self {
        self.routes.push((gate, notifier));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Send to every channel whose gate admits the event. Never fails.
    pub async fn notify(&self, ev: &NotificationEvent) {
        for (gate, n) in &self.routes {
            if !gate.admits(ev.kind) {
                tracing::debug!(channel = n.channel(), kind = ev.kind.as_str(), "notification gated off");
                continue;
            }
            match n.send(ev).await {
                Ok(()) => tracing::info!(channel = n.channel(), kind = ev.kind.as_str(), "notification sent"),
                Err(e) => tracing::warn!(channel = n.channel(), error = %format!("{e:#}"), "notification failed"),
            }
        }
    }
}

/// Builds the channel set for the current schedule state. Targets live in
/// the state, so the mux is rebuilt for every run.
pub trait NotifierFactory: Send + Sync {
    fn build(&self, cfg: &NotificationConfig) -> NotifierMux;
}

/// Real transports: SMTP settings from env, webhook URL from state.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvNotifierFactory;

impl NotifierFactory for EnvNotifierFactory {
    fn build(&self, cfg: &NotificationConfig) -> NotifierMux {
        let mut mux = NotifierMux::new();
        if cfg.email.is_active() {
            match EmailNotifier::from_env(&cfg.email.target) {
                Ok(n) => mux = mux.with((&cfg.email).into(), Arc::new(n)),
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "email channel enabled but unusable"),
            }
        }
        if cfg.webhook.is_active() {
            mux = mux.with(
                (&cfg.webhook).into(),
                Arc::new(WebhookNotifier::new(cfg.webhook.target.clone())),
            );
        }
        mux
    }
}
