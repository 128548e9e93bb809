// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collector_runs_total", "Collection sessions executed.");
        describe_counter!(
            "collector_source_errors_total",
            "Source fetch failures (each attempt)."
        );
        describe_counter!(
            "collector_items_kept_total",
            "Items written to the snapshot."
        );
        describe_counter!(
            "collector_items_filtered_total",
            "Candidates dropped as duplicates or below the relevance threshold."
        );
        describe_histogram!("collector_run_seconds", "Collection session duration in seconds.");
        describe_histogram!("collector_fetch_ms", "Source fetch time in milliseconds.");
        describe_gauge!(
            "collector_last_run_ts",
            "Unix ts when the collector last completed a session."
        );
        describe_counter!(
            "scheduler_runs_total",
            "Scheduler triggers that reached the pipeline, by outcome."
        );
        describe_counter!(
            "scheduler_skips_total",
            "Scheduler triggers skipped, by reason."
        );
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        describe_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
