// tests/pipeline.rs
//
// Coordinator behaviour against scripted sources and an in-memory store:
// ranking, tie-breaks, caps, dedup, per-source failure, retries, budget and
// write failure.

mod common;

use std::time::Duration;

use common::*;
use map_collector::ingest::Category;
use map_collector::pipeline::RunStats;
use map_collector::store::Slot;
use map_collector::Profile;

fn titles(result: &map_collector::RunResult) -> Vec<&str> {
    result.data.iter().map(|i| i.title.as_str()).collect()
}

#[tokio::test]
async fn feed_and_page_are_ranked_and_persisted() {
    let fetcher = ScriptedFetcher::new()
        .reply("Business", vec![Reply::Body(fixture("business_feed.xml"))])
        .reply("Search", vec![Reply::Body(fixture("news_search.html"))]);
    let h = harness(
        vec![feed("Business"), page("Search")],
        fetcher,
        fast_settings(Profile::Production),
    );

    let result = h.coordinator.run_once().await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        titles(&result),
        vec![
            "Aromatic Plants Export Market Expands to Europe",
            "Herbal Medicine Industry Shows 8.1% CAGR Growth",
            "Medicinal Plant Market Reaches $410B in Global Valuation",
            "Investment Opportunities in Plant-Based Pharmaceuticals & Nutraceutical Growth",
            "Regulation of botanical supplements tightens in EU",
            "New Research on Essential Oil Therapeutic Properties",
        ]
    );
    assert_eq!(result.items_count, 6);
    assert_eq!(result.sources.succeeded, 2);

    let first = &result.data[0];
    assert_eq!(first.relevance_score, 0.8);
    assert_eq!(first.category, Category::MarketAnalysis);
    assert_eq!(first.url, "https://news.example.test/aromatic-export");
    assert_eq!(first.timestamp, 1_756_807_200);
    assert_eq!(first.date_scraped, noon());

    let herbal = &result.data[1];
    assert_eq!(herbal.source, "Search");
    assert_eq!(herbal.url, "https://search.example.test/");
    assert_eq!(herbal.word_count, 6);

    let categories: Vec<Category> = result.data.iter().map(|i| i.category).collect();
    assert_eq!(
        categories[3..],
        [Category::Investment, Category::Regulatory, Category::Research]
    );

    // snapshot on disk is exactly the returned data; stats describe it
    let snapshot = h.store.get(Slot::Snapshot).expect("snapshot written");
    let on_disk: Vec<map_collector::ingest::ScoredItem> = serde_json::from_slice(&snapshot).unwrap();
    assert_eq!(on_disk, result.data);

    let stats: RunStats = serde_json::from_slice(&h.store.get(Slot::Stats).unwrap()).unwrap();
    assert_eq!(stats.items_collected, 6);
    assert_eq!(stats.last_run, noon());
    assert_eq!(stats.source_histogram["Business"], 2);
    assert_eq!(stats.source_histogram["Search"], 4);
    assert_eq!(stats.category_histogram[&Category::MarketAnalysis], 3);
    // (0.8 + 0.8 + 0.65 + 0.6 + 0.5 + 0.3) / 6 = 0.6083
    assert_eq!(stats.average_relevance, 0.608);

    use sha2::Digest as _;
    let digest = sha2::Sha256::digest(&snapshot);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    assert_eq!(stats.snapshot_sha256, hex);
}

#[tokio::test]
async fn equal_scores_keep_registry_order() {
    let fetcher = ScriptedFetcher::new()
        .reply("Zeta", vec![Reply::Body(headlines_html(&["Botanical remedies gain ground"]))])
        .reply("Alpha", vec![Reply::Body(headlines_html(&["Phytotherapy clinics open downtown"]))]);
    let h = harness(
        vec![page("Zeta"), page("Alpha")],
        fetcher,
        fast_settings(Profile::Production),
    );

    let result = h.coordinator.run_once().await;
    assert_eq!(result.data[0].relevance_score, result.data[1].relevance_score);
    assert_eq!(result.data[0].source, "Zeta");
    assert_eq!(result.data[1].source, "Alpha");
}

#[tokio::test]
async fn snapshot_is_capped_at_twenty() {
    let make = |prefix: &str| {
        let owned: Vec<String> = (0..12)
            .map(|i| format!("{prefix} herbal medicine market update number {i}"))
            .collect();
        let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
        headlines_html(&refs)
    };
    let fetcher = ScriptedFetcher::new()
        .reply("A", vec![Reply::Body(make("Alpha"))])
        .reply("B", vec![Reply::Body(make("Beta"))])
        .reply("C", vec![Reply::Body(make("Gamma"))]);
    let h = harness(
        vec![page("A"), page("B"), page("C")],
        fetcher,
        fast_settings(Profile::Production),
    );

    let result = h.coordinator.run_once().await;
    // 3 sources × per-source cap 10 = 30 candidates, snapshot keeps 20
    assert_eq!(result.items_count, 20);
    assert!(result.data.iter().take(10).all(|i| i.source == "A"));
    assert!(result.data.iter().skip(10).all(|i| i.source == "B"));
}

#[tokio::test]
async fn duplicate_titles_across_sources_keep_the_first_source() {
    let shared = "Herbal Medicine Industry Shows 8.1% CAGR Growth";
    let fetcher = ScriptedFetcher::new()
        .reply("First", vec![Reply::Body(headlines_html(&[shared]))])
        .reply("Second", vec![Reply::Body(headlines_html(&[shared]))]);
    let h = harness(
        vec![page("First"), page("Second")],
        fetcher,
        fast_settings(Profile::Production),
    );

    let result = h.coordinator.run_once().await;
    assert_eq!(result.items_count, 1);
    assert_eq!(result.data[0].source, "First");
}

#[tokio::test]
async fn failing_source_is_skipped_not_fatal() {
    let fetcher = ScriptedFetcher::new()
        .reply("Down", vec![Reply::Fail])
        .reply("Up", vec![Reply::Body(fixture("news_search.html"))]);
    let h = harness(
        vec![page("Down"), page("Up")],
        fetcher,
        fast_settings(Profile::Production),
    );

    let result = h.coordinator.run_once().await;
    assert!(result.success);
    assert_eq!(result.items_count, 4);
    assert_eq!(result.sources.failed, 1);
    assert_eq!(result.sources.succeeded, 1);
    // production profile: 2 fetch attempts per source
    assert_eq!(h.fetcher.calls_for("Down"), 2);
    assert_eq!(h.fetcher.calls_for("Up"), 1);
}

#[tokio::test]
async fn transient_fetch_failure_is_retried() {
    let fetcher = ScriptedFetcher::new().reply(
        "Flaky",
        vec![Reply::Fail, Reply::Body(fixture("news_search.html"))],
    );
    let h = harness(vec![page("Flaky")], fetcher, fast_settings(Profile::Standard));

    let result = h.coordinator.run_once().await;
    assert_eq!(h.fetcher.calls_for("Flaky"), 2);
    assert_eq!(result.sources.succeeded, 1);
    assert!(result.items_count > 0);
}

#[tokio::test]
async fn malformed_feed_is_not_retried() {
    let fetcher = ScriptedFetcher::new().reply("Broken", vec![Reply::Body("<html><body>not a feed</body></html>".into())]);
    let h = harness(vec![feed("Broken")], fetcher, fast_settings(Profile::Standard));

    let result = h.coordinator.run_once().await;
    assert!(result.success);
    assert_eq!(result.sources.failed, 1);
    assert_eq!(h.fetcher.calls_for("Broken"), 1);
}

#[tokio::test(start_paused = true)]
async fn collection_stops_when_budget_runs_low() {
    let slow = |t: &str| Reply::Slow(Duration::from_secs(30), headlines_html(&[t]));
    let fetcher = ScriptedFetcher::new()
        .reply("S1", vec![slow("Botanical extracts market grows")])
        .reply("S2", vec![slow("Phytotherapy demand rises sharply")])
        .reply("S3", vec![slow("Herbal medicine exports climb again")]);
    let h = harness(
        vec![page("S1"), page("S2"), page("S3")],
        fetcher,
        fast_settings(Profile::Production),
    );

    let result = h.coordinator.run_once().await;
    // t=0 S1, t=30 S2 (30 + 10 reserve ≤ 60), t=60 stop
    assert!(result.success);
    assert_eq!(result.sources.attempted, 2);
    assert_eq!(result.sources.skipped, 1);
    assert_eq!(h.fetcher.calls(), vec!["S1".to_string(), "S2".to_string()]);
    assert_eq!(result.items_count, 2);
}

#[tokio::test(start_paused = true)]
async fn politeness_delay_separates_sources() {
    let fetcher = ScriptedFetcher::new()
        .reply("A", vec![Reply::Body(headlines_html(&["Botanical extracts market grows"]))])
        .reply("B", vec![Reply::Body(headlines_html(&["Phytotherapy demand rises sharply"]))]);
    let mut settings = fast_settings(Profile::Production);
    settings.request_delay_secs = 3;
    let h = harness(vec![page("A"), page("B")], fetcher, settings);

    let result = h.coordinator.run_once().await;
    assert!(result.execution_time >= 3.0, "got {}", result.execution_time);
    assert!(result.execution_time < 4.0, "got {}", result.execution_time);
}

#[tokio::test]
async fn snapshot_write_failure_keeps_previous_snapshot() {
    let fetcher = ScriptedFetcher::new().reply("Up", vec![Reply::Body(fixture("news_search.html"))]);
    let h = harness(vec![page("Up")], fetcher, fast_settings(Profile::Production));
    h.store.put(Slot::Snapshot, b"[\"previous\"]".to_vec());
    h.store.reject_writes(Slot::Snapshot, true);

    let result = h.coordinator.run_once().await;
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("failed to save data"));
    assert!(result.data.is_empty());
    assert_eq!(h.store.get(Slot::Snapshot).unwrap(), b"[\"previous\"]".to_vec());
    assert!(h.store.get(Slot::Stats).is_none());
}

#[tokio::test]
async fn stats_write_failure_rolls_back_the_snapshot() {
    let fetcher = ScriptedFetcher::new().reply("Up", vec![Reply::Body(fixture("news_search.html"))]);
    let h = harness(vec![page("Up")], fetcher, fast_settings(Profile::Production));
    h.store.put(Slot::Snapshot, b"[]".to_vec());
    h.store.put(Slot::Stats, b"{\"items_collected\":0}".to_vec());
    h.store.reject_writes(Slot::Stats, true);

    let result = h.coordinator.run_once().await;
    assert!(!result.success);
    assert!(result.data.is_empty());
    assert_eq!(h.store.get(Slot::Snapshot).unwrap(), b"[]".to_vec());
    assert_eq!(
        h.store.get(Slot::Stats).unwrap(),
        b"{\"items_collected\":0}".to_vec()
    );
}

#[tokio::test]
async fn stats_write_failure_on_first_run_leaves_no_snapshot() {
    let fetcher = ScriptedFetcher::new().reply("Up", vec![Reply::Body(fixture("news_search.html"))]);
    let h = harness(vec![page("Up")], fetcher, fast_settings(Profile::Production));
    h.store.reject_writes(Slot::Stats, true);

    let result = h.coordinator.run_once().await;
    assert!(!result.success);
    assert!(h.store.get(Slot::Snapshot).is_none());
    assert!(h.store.get(Slot::Stats).is_none());
}

#[tokio::test]
async fn repeated_runs_with_fixed_clock_write_identical_snapshots() {
    let fetcher = ScriptedFetcher::new()
        .reply("Business", vec![Reply::Body(fixture("business_feed.xml"))])
        .reply("Search", vec![Reply::Body(fixture("news_search.html"))]);
    let h = harness(
        vec![feed("Business"), page("Search")],
        fetcher,
        fast_settings(Profile::Production),
    );

    h.coordinator.run_once().await;
    let first = h.store.get(Slot::Snapshot).unwrap();
    h.coordinator.run_once().await;
    assert_eq!(h.store.get(Slot::Snapshot).unwrap(), first);
}

#[tokio::test]
async fn standard_profile_filters_harder() {
    let fetcher = ScriptedFetcher::new().reply("Search", vec![Reply::Body(fixture("news_search.html"))]);
    let cfg = map_collector::CollectorConfig::for_profile(Profile::Standard);
    let mut settings = cfg.pipeline.clone();
    settings.request_delay_secs = 0;
    let store = std::sync::Arc::new(map_collector::store::MemoryStore::new());
    let coordinator = map_collector::Coordinator::new(
        settings,
        map_collector::ingest::SourceRegistry::new(vec![page("Search")]),
        std::sync::Arc::new(fetcher),
        map_collector::ingest::Extractor::new(cfg.extract.clone()).unwrap(),
        cfg.scorer(),
        store,
        std::sync::Arc::new(map_collector::clock::FixedClock::at(noon())),
    );

    let result = coordinator.run_once().await;
    // normalizer 3.0, threshold 0.3:
    //   herbal 1.6/3 = 0.5333, medicinal 1.3/3 = 0.4333, botanical 1.0/3 = 0.3333, essential oil 0.2
    assert_eq!(
        titles(&result),
        vec![
            "Herbal Medicine Industry Shows 8.1% CAGR Growth",
            "Medicinal Plant Market Reaches $410B in Global Valuation",
            "Regulation of botanical supplements tightens in EU",
        ]
    );
    assert_eq!(result.data[0].relevance_score, 0.5333);
}
