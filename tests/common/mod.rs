// tests/common/mod.rs
//
// Shared doubles for integration tests: scripted fetcher, scripted pipeline,
// recording notifiers and a coordinator builder over MemoryStore/FixedClock.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use map_collector::clock::FixedClock;
use map_collector::error::FetchError;
use map_collector::ingest::{Extractor, Fetcher, RawFetch, Source, SourceKind, SourceRegistry};
use map_collector::notify::{
    ChannelGate, EventKind, NotificationEvent, Notifier, NotifierFactory, NotifierMux,
};
use map_collector::pipeline::{Coordinator, Pipeline, PipelineSettings, RunResult};
use map_collector::scheduler::NotificationConfig;
use map_collector::store::MemoryStore;
use map_collector::{CollectorConfig, Profile};

pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
}

pub fn page(name: &str) -> Source {
    Source::new(name, format!("https://{}.example.test/", name.to_lowercase()), SourceKind::Page)
}

pub fn feed(name: &str) -> Source {
    Source::new(name, format!("https://{}.example.test/rss", name.to_lowercase()), SourceKind::Feed)
}

/// HTML page with one `<h2>` per title.
pub fn headlines_html(titles: &[&str]) -> String {
    let mut s = String::from("<html><head><title>x</title></head><body>\n");
    for t in titles {
        s.push_str(&format!("<h2>{t}</h2>\n"));
    }
    s.push_str("</body></html>");
    s
}

#[derive(Clone)]
pub enum Reply {
    Body(String),
    Fail,
    /// Sleep (tokio time) then answer with the body.
    Slow(Duration, String),
}

/// Replies per source name, consumed in order; the last reply repeats.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, source: &str, replies: Vec<Reply>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(source.to_string(), replies.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, source: &str) -> usize {
        self.calls().iter().filter(|c| *c == source).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source) -> RawFetch {
        self.calls.lock().unwrap().push(source.name.clone());
        let reply = {
            let mut map = self.replies.lock().unwrap();
            match map.get_mut(&source.name) {
                Some(q) if q.len() > 1 => q.pop_front(),
                Some(q) => q.front().cloned(),
                None => None,
            }
        };
        let fail = || {
            RawFetch::failed(
                source,
                FetchError::Network {
                    locator: source.locator.clone(),
                    reason: "connection refused".into(),
                },
                0,
            )
        };
        match reply {
            Some(Reply::Body(b)) => RawFetch::ok(source, b, 1_757_160_000),
            Some(Reply::Slow(d, b)) => {
                tokio::time::sleep(d).await;
                RawFetch::ok(source, b, 1_757_160_000)
            }
            Some(Reply::Fail) | None => fail(),
        }
    }
}

pub fn fast_settings(profile: Profile) -> PipelineSettings {
    let mut s = CollectorConfig::for_profile(profile).pipeline;
    s.request_delay_secs = 0;
    s
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub coordinator: Arc<Coordinator>,
}

pub fn harness(
    sources: Vec<Source>,
    fetcher: ScriptedFetcher,
    settings: PipelineSettings,
) -> Harness {
    let cfg = CollectorConfig::for_profile(Profile::Production);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at(noon()));
    let fetcher = Arc::new(fetcher);
    let coordinator = Arc::new(Coordinator::new(
        settings,
        SourceRegistry::new(sources),
        fetcher.clone(),
        Extractor::new(cfg.extract.clone()).unwrap(),
        cfg.scorer(),
        store.clone(),
        clock.clone(),
    ));
    Harness {
        store,
        clock,
        fetcher,
        coordinator,
    }
}

pub enum Step {
    Ok,
    Fail(&'static str),
    Panic,
}

/// Pipeline double that plays steps in order; the last one repeats.
pub struct ScriptedPipeline {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<u32>,
}

impl ScriptedPipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Pipeline for ScriptedPipeline {
    async fn run_once(&self) -> RunResult {
        *self.calls.lock().unwrap() += 1;
        let panic_now;
        let result = {
            let mut steps = self.steps.lock().unwrap();
            let step = if steps.len() > 1 {
                steps.pop_front()
            } else {
                None
            };
            let step = step.as_ref().or(steps.front());
            panic_now = matches!(step, Some(Step::Panic));
            match step {
                Some(Step::Fail(e)) => RunResult::failed(*e, 0.1),
                _ => RunResult {
                    success: true,
                    items_count: 0,
                    execution_time: 0.1,
                    error: None,
                    data: vec![],
                    sources: Default::default(),
                },
            }
        };
        if panic_now {
            panic!("scripted pipeline panic");
        }
        result
    }
}

/// Records every delivered event per channel.
pub struct Recorder {
    pub channel: &'static str,
    pub events: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Notifier for Recorder {
    fn channel(&self) -> &'static str {
        self.channel
    }

    async fn send(&self, ev: &NotificationEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(ev.kind);
        Ok(())
    }
}

/// Builds the mux from the state's gates, delivering into recorders.
#[derive(Clone)]
pub struct RecordingFactory {
    pub email: Arc<Recorder>,
    pub webhook: Arc<Recorder>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self {
            email: Arc::new(Recorder {
                channel: "email",
                events: Mutex::new(vec![]),
            }),
            webhook: Arc::new(Recorder {
                channel: "webhook",
                events: Mutex::new(vec![]),
            }),
        }
    }

    pub fn email_events(&self) -> Vec<EventKind> {
        self.email.events.lock().unwrap().clone()
    }

    pub fn webhook_events(&self) -> Vec<EventKind> {
        self.webhook.events.lock().unwrap().clone()
    }
}

impl NotifierFactory for RecordingFactory {
    fn build(&self, cfg: &NotificationConfig) -> NotifierMux {
        let mut mux = NotifierMux::new();
        if cfg.email.is_active() {
            mux = mux.with(ChannelGate::from(&cfg.email), self.email.clone());
        }
        if cfg.webhook.is_active() {
            mux = mux.with(ChannelGate::from(&cfg.webhook), self.webhook.clone());
        }
        mux
    }
}
