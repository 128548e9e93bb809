// src/service.rs
//! Query surface for the presentation layer: snapshot and stats readers plus
//! schedule control. Readers never fail; missing files read as "no data yet".

use std::sync::Arc;

use crate::error::{SchedulerRunError, SnapshotWriteError, StateUpdateError};
use crate::ingest::ScoredItem;
use crate::pipeline::RunStats;
use crate::scheduler::{ScheduleOutcome, ScheduleState, Scheduler, SchedulerStatus, Trigger};
use crate::store::{load_json, Slot, Store};

#[derive(Clone)]
pub struct CollectorService {
    store: Arc<dyn Store>,
    scheduler: Arc<Scheduler>,
}

impl CollectorService {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<Scheduler>) -> Self {
        Self { store, scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Latest snapshot, best first.
    pub async fn get_data(&self) -> Vec<ScoredItem> {
        load_json(self.store.as_ref(), Slot::Snapshot)
            .await
            .unwrap_or_default()
    }

    pub async fn get_stats(&self) -> Option<RunStats> {
        load_json(self.store.as_ref(), Slot::Stats).await
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<ScheduleState, SnapshotWriteError> {
        self.scheduler.set_enabled(enabled).await
    }

    pub async fn update_config(
        &self,
        patch: &serde_json::Value,
    ) -> Result<ScheduleState, StateUpdateError> {
        self.scheduler.update_config(patch).await
    }

    /// Forced run: ignores enabled / quiet hours / interval, not a live lock.
    pub async fn run_now(&self) -> Result<ScheduleOutcome, SchedulerRunError> {
        self.scheduler.run(Trigger::Forced).await
    }

    /// Periodic tick.
    pub async fn run_scheduled(&self) -> Result<ScheduleOutcome, SchedulerRunError> {
        self.scheduler.run(Trigger::Scheduled).await
    }
}
