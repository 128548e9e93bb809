// src/scheduler/state.rs
//! Persisted schedule configuration and bookkeeping.
//!
//! Every field has a default, so a partial or older file merges over the
//! defaults on load.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleState {
    pub enabled: bool,
    pub interval_hours: u64,
    /// Seconds after which a run lock counts as abandoned.
    pub max_execution_time: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub quiet_hours: QuietHours,
    pub retry_policy: RetryPolicy,
    pub notifications: NotificationConfig,
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: 4,
            max_execution_time: 300,
            last_run: None,
            next_run: None,
            quiet_hours: QuietHours::default(),
            retry_policy: RetryPolicy::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl ScheduleState {
    pub fn interval_secs(&self) -> i64 {
        i64::try_from(self.interval_hours.saturating_mul(3600)).unwrap_or(i64::MAX)
    }

    /// Apply a partial update given as JSON. Objects merge key by key;
    /// `last_run` / `next_run` belong to the scheduler and are ignored.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut base = serde_json::to_value(self)?;
        let mut patch = patch.clone();
        if let Some(obj) = patch.as_object_mut() {
            obj.remove("last_run");
            obj.remove("next_run");
        }
        merge_json(&mut base, patch);
        serde_json::from_value(base)
    }
}

fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(b), serde_json::Value::Object(p)) => {
            for (k, v) in p {
                match b.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (b, p) => *b = p,
    }
}

/// Daily window in local time during which scheduled runs are suppressed.
/// Either bound empty disables the window; a missing bound takes its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    #[serde(with = "hhmm")]
    pub start: Option<NaiveTime>,
    #[serde(with = "hhmm")]
    pub end: Option<NaiveTime>,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(23, 0, 0),
            end: NaiveTime::from_hms_opt(6, 0, 0),
        }
    }
}

impl QuietHours {
    pub fn disabled() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn between(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        let Some(raw) = raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid time `{raw}`: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total pipeline attempts per triggered run.
    pub attempts: u32,
    pub delay_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub email: ChannelConfig,
    pub webhook: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Recipient address (email) or URL (webhook).
    pub target: String,
    pub on_success: bool,
    pub on_failure: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: String::new(),
            on_success: false,
            on_failure: true,
        }
    }
}

impl ChannelConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.target.trim().is_empty()
    }
}
