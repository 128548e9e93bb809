// src/pipeline.rs
//! Pipeline coordinator: registry → fetch → extract → score → filter / sort /
//! cap → snapshot + stats.
//!
//! Sources are processed sequentially in registry order with a politeness
//! delay between them. Before each source the wall-clock budget is checked;
//! when too little remains the run stops collecting and persists what it has.
//! A failing source is logged and skipped. Only a failed write fails the run,
//! and since writes are atomic replaces the previous snapshot stays valid.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::analyze::{word_count, RelevanceScorer};
use crate::clock::Clock;
use crate::config::CollectorConfig;
use crate::error::{SnapshotWriteError, SourceError};
use crate::ingest::{Candidate, Category, Extractor, Fetcher, ScoredItem, Source, SourceRegistry};
use crate::store::{save_json, Slot, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub relevance_threshold: f64,
    pub max_items: usize,
    pub execution_budget_secs: u64,
    /// Minimum budget that must remain to start another source.
    pub budget_reserve_secs: u64,
    /// Pause between consecutive sources; also the per-source backoff unit.
    pub request_delay_secs: u64,
    /// Fetch attempts per source.
    pub source_retries: u32,
}

impl PipelineSettings {
    fn budget(&self) -> Duration {
        Duration::from_secs(self.execution_budget_secs)
    }

    fn reserve(&self) -> Duration {
        Duration::from_secs(self.budget_reserve_secs)
    }

    fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}

/// Derived from the snapshot at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub last_run: DateTime<Utc>,
    pub execution_time: f64,
    pub items_collected: usize,
    pub average_relevance: f64,
    pub category_histogram: BTreeMap<Category, usize>,
    pub source_histogram: BTreeMap<String, usize>,
    /// Hex SHA-256 of the snapshot bytes these stats describe.
    pub snapshot_sha256: String,
}

impl RunStats {
    pub fn describe(
        items: &[ScoredItem],
        snapshot_bytes: &[u8],
        last_run: DateTime<Utc>,
        execution_time: f64,
    ) -> Self {
        let mut category_histogram = BTreeMap::new();
        let mut source_histogram = BTreeMap::new();
        for it in items {
            *category_histogram.entry(it.category).or_insert(0) += 1;
            *source_histogram.entry(it.source.clone()).or_insert(0) += 1;
        }
        Self {
            last_run,
            execution_time,
            items_collected: items.len(),
            average_relevance: round_to(average_relevance(items), 3),
            category_histogram,
            source_histogram,
            snapshot_sha256: sha256_hex(snapshot_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Sources never started because the execution budget ran low.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub items_count: usize,
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Vec<ScoredItem>,
    #[serde(default)]
    pub sources: SourceTally,
}

impl RunResult {
    pub fn failed(error: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            items_count: 0,
            execution_time,
            error: Some(error.into()),
            data: Vec::new(),
            sources: SourceTally::default(),
        }
    }

    pub fn average_relevance(&self) -> f64 {
        average_relevance(&self.data)
    }
}

/// Anything the scheduler can drive as one collection session.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run_once(&self) -> RunResult;
}

pub struct Coordinator {
    settings: PipelineSettings,
    registry: SourceRegistry,
    fetcher: Arc<dyn Fetcher>,
    extractor: Extractor,
    scorer: RelevanceScorer,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(
        settings: PipelineSettings,
        registry: SourceRegistry,
        fetcher: Arc<dyn Fetcher>,
        extractor: Extractor,
        scorer: RelevanceScorer,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            registry,
            fetcher,
            extractor,
            scorer,
            store,
            clock,
        }
    }

    /// Wire a coordinator from loaded configuration.
    pub fn from_config(
        cfg: &CollectorConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(
            cfg.pipeline.clone(),
            cfg.registry(),
            fetcher,
            Extractor::new(cfg.extract.clone())?,
            cfg.scorer(),
            store,
            clock,
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn scorer(&self) -> &RelevanceScorer {
        &self.scorer
    }

    /// One full collection session. Never returns `Err`; failures are
    /// reported through `RunResult`.
    pub async fn run_once(&self) -> RunResult {
        crate::metrics::describe_metrics();
        let started = Instant::now();
        info!(target: "pipeline", sources = self.registry.len(), "collection session starting");

        let (candidates, tally) = self.collect(started).await;
        let scraped_at = self.clock.now();
        let items = self.rank(candidates, scraped_at);

        let execution_time = round_to(started.elapsed().as_secs_f64(), 2);
        let result = match self.persist(&items, scraped_at, execution_time).await {
            Ok(stats) => {
                if tally.attempted > 0 && tally.succeeded == 0 {
                    warn!(target: "pipeline", failed = tally.failed, "no source produced content; wrote empty snapshot");
                }
                info!(
                    target: "pipeline",
                    items = stats.items_collected,
                    average_relevance = stats.average_relevance,
                    execution_time,
                    "collection session completed"
                );
                RunResult {
                    success: true,
                    items_count: items.len(),
                    execution_time,
                    error: None,
                    data: items,
                    sources: tally,
                }
            }
            Err(e) => {
                error!(target: "pipeline", error = %e, "snapshot write failed; previous snapshot kept");
                RunResult {
                    sources: tally,
                    ..RunResult::failed(format!("failed to save data: {e}"), execution_time)
                }
            }
        };

        counter!("collector_runs_total").increment(1);
        histogram!("collector_run_seconds").record(started.elapsed().as_secs_f64());
        gauge!("collector_last_run_ts").set(scraped_at.timestamp() as f64);
        result
    }

    /// Fetch and extract every source in registry order, within budget.
    pub async fn collect(&self, started: Instant) -> (Vec<Candidate>, SourceTally) {
        let mut tally = SourceTally::default();
        let mut candidates = Vec::new();
        let budget = self.settings.budget();
        let reserve = self.settings.reserve();
        let delay = self.settings.request_delay();

        for (idx, source) in self.registry.iter().enumerate() {
            if started.elapsed() + reserve > budget {
                tally.skipped = self.registry.len() - idx;
                info!(
                    target: "pipeline",
                    elapsed_secs = started.elapsed().as_secs(),
                    skipped = tally.skipped,
                    "approaching execution budget; stopping collection"
                );
                break;
            }
            if idx > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            tally.attempted += 1;
            debug!(target: "pipeline", source = %source.name, "collecting");
            match self.collect_source(source).await {
                Ok(found) => {
                    tally.succeeded += 1;
                    info!(target: "pipeline", source = %source.name, items = found.len(), "source collected");
                    candidates.extend(found);
                }
                Err(e) => {
                    tally.failed += 1;
                    warn!(target: "pipeline", source = %source.name, error = %e, "source skipped");
                }
            }
        }

        (candidates, tally)
    }

    async fn collect_source(&self, source: &Source) -> Result<Vec<Candidate>, SourceError> {
        let attempts = self.settings.source_retries.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut raw = self.fetcher.fetch(source).await;
            match raw.error.take() {
                None => return Ok(self.extractor.extract_all(&raw)?),
                Some(e) if attempt < attempts => {
                    debug!(target: "pipeline", source = %source.name, attempt, error = %e, "fetch failed; retrying");
                    tokio::time::sleep(self.settings.request_delay() * attempt).await;
                }
                Some(e) => return Err(e.into()),
            }
        }
    }

    /// Drop cross-source duplicates, score, filter by threshold, sort by score
    /// (stable, so ties keep collection order) and cap.
    pub fn rank(&self, candidates: Vec<Candidate>, scraped_at: DateTime<Utc>) -> Vec<ScoredItem> {
        let threshold = self.settings.relevance_threshold;
        let total = candidates.len();
        let mut seen: HashSet<String> = HashSet::new();

        let mut items: Vec<ScoredItem> = candidates
            .into_iter()
            .filter(|c| seen.insert(c.text.clone()))
            .filter_map(|c| {
                let score = self.scorer.score(&c.text);
                (score >= threshold).then(|| ScoredItem {
                    category: self.scorer.categorize(&c.text),
                    word_count: word_count(&c.text),
                    title: c.text,
                    source: c.source_name,
                    url: c.source_locator,
                    timestamp: c.observed_at,
                    relevance_score: score,
                    date_scraped: scraped_at,
                })
            })
            .collect();

        items.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        counter!("collector_items_filtered_total").increment((total - items.len()) as u64);
        items.truncate(self.settings.max_items);
        counter!("collector_items_kept_total").increment(items.len() as u64);
        items
    }

    async fn persist(
        &self,
        items: &[ScoredItem],
        scraped_at: DateTime<Utc>,
        execution_time: f64,
    ) -> Result<RunStats, SnapshotWriteError> {
        let previous = self.store.read(Slot::Snapshot).await?;
        let bytes = save_json(self.store.as_ref(), Slot::Snapshot, items).await?;
        let stats = RunStats::describe(items, &bytes, scraped_at, execution_time);
        if let Err(e) = save_json(self.store.as_ref(), Slot::Stats, &stats).await {
            self.restore_snapshot(previous).await;
            return Err(e);
        }
        Ok(stats)
    }

    /// Put the snapshot back the way it was so it keeps matching the stats
    /// on disk.
    async fn restore_snapshot(&self, previous: Option<Vec<u8>>) {
        let restored = match previous {
            Some(bytes) => self.store.write_atomic(Slot::Snapshot, &bytes).await,
            None => self.store.remove(Slot::Snapshot).await,
        };
        if let Err(e) = restored {
            error!(error = %e, "could not restore previous snapshot after stats write failure");
        }
    }
}

#[async_trait]
impl Pipeline for Coordinator {
    async fn run_once(&self) -> RunResult {
        Coordinator::run_once(self).await
    }
}

fn average_relevance(items: &[ScoredItem]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    items.iter().map(|i| i.relevance_score).sum::<f64>() / items.len() as f64
}

fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
