// tests/e2e_synthetic.rs
//
// Full stack on disk: file store in a temp dir, the real HTTP fetcher on the
// built-in synthetic digest (no network), the scheduler and query service.

use std::sync::Arc;

use map_collector::clock::SystemClock;
use map_collector::ingest::fetch::synthetic::MARKET_DIGEST_LOCATOR;
use map_collector::ingest::{HttpFetcher, Source, SourceKind};
use map_collector::notify::EnvNotifierFactory;
use map_collector::scheduler::NoDelay;
use map_collector::store::{FileStore, Slot};
use map_collector::{CollectorConfig, CollectorService, Coordinator, ScheduleOutcome, Scheduler};

#[tokio::test]
async fn forced_run_writes_snapshot_stats_and_schedule_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = CollectorConfig::default();
    cfg.sources = vec![Source::new("Market Digest", MARKET_DIGEST_LOCATOR, SourceKind::Synthetic)];
    cfg.pipeline.request_delay_secs = 0;
    cfg.storage.dir = dir.path().to_path_buf();

    let clock = Arc::new(SystemClock);
    let store = Arc::new(FileStore::new(cfg.storage.dir.clone()));
    let fetcher = Arc::new(HttpFetcher::new(cfg.fetch.clone(), clock.clone()).unwrap());
    let coordinator =
        Arc::new(Coordinator::from_config(&cfg, fetcher, store.clone(), clock.clone()).unwrap());
    let scheduler = Scheduler::new(store.clone(), clock, coordinator, Arc::new(EnvNotifierFactory))
        .with_backoff(Arc::new(NoDelay));
    let service = CollectorService::new(store.clone(), Arc::new(scheduler));

    let outcome = service.run_now().await.unwrap();
    let ScheduleOutcome::Completed(report) = outcome else {
        panic!("expected completed run");
    };
    assert!(report.succeeded());

    let data = service.get_data().await;
    let titles: Vec<&str> = data.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Herbal Medicine Industry Shows 8.1% CAGR Growth",
            "Aromatic Plants Export Market Expands to Europe",
            "Medicinal Plant Market Reaches $410B in Global Valuation",
            "New Research on Essential Oil Therapeutic Properties",
        ]
    );
    assert!(data.iter().all(|i| i.source == "Market Digest"));

    let stats = service.get_stats().await.expect("stats written");
    assert_eq!(stats.items_collected, 4);

    for slot in [Slot::Snapshot, Slot::Stats, Slot::Schedule] {
        assert!(store.path_for(slot).exists(), "{slot} missing");
    }
    assert!(!store.path_for(Slot::Lock).exists());

    let status = service.get_status().await;
    assert!(status.last_run.is_some());
    assert!(!status.running);
}

#[tokio::test]
async fn scheduled_trigger_on_fresh_dir_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = CollectorConfig::default();
    cfg.storage.dir = dir.path().to_path_buf();
    let app = map_collector::App::from_config(cfg).unwrap();

    let outcome = app.service.run_scheduled().await.unwrap();
    assert_eq!(
        outcome,
        ScheduleOutcome::Skipped(map_collector::SkipReason::Disabled)
    );
    assert!(app.service.get_data().await.is_empty());
}
