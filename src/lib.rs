// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod store;

use std::sync::Arc;

pub use crate::config::{CollectorConfig, Profile};
pub use crate::pipeline::{Coordinator, Pipeline, RunResult, RunStats};
pub use crate::scheduler::{ScheduleOutcome, Scheduler, SkipReason, Trigger};
pub use crate::service::CollectorService;

use crate::clock::{Clock, SystemClock};
use crate::ingest::HttpFetcher;
use crate::notify::EnvNotifierFactory;
use crate::store::{FileStore, Store};

/// Fully wired production components sharing one store and clock.
pub struct App {
    pub config: CollectorConfig,
    pub store: Arc<dyn Store>,
    pub coordinator: Arc<Coordinator>,
    pub service: CollectorService,
}

impl App {
    /// File store in `config.storage.dir`, HTTP fetcher, system clock,
    /// env-configured notifiers.
    pub fn from_config(config: CollectorConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn Store> = Arc::new(FileStore::new(config.storage.dir.clone()));
        let fetcher = Arc::new(HttpFetcher::new(config.fetch.clone(), clock.clone())?);
        let coordinator = Arc::new(Coordinator::from_config(
            &config,
            fetcher,
            store.clone(),
            clock.clone(),
        )?);
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            clock,
            coordinator.clone(),
            Arc::new(EnvNotifierFactory),
        ));
        let service = CollectorService::new(store.clone(), scheduler);
        Ok(Self {
            config,
            store,
            coordinator,
            service,
        })
    }
}
