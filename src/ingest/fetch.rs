// src/ingest/fetch.rs
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::FetchError;
use crate::ingest::types::{RawFetch, Source, SourceKind};

pub const DEFAULT_USER_AGENT: &str = "MAPBot/2.1 (+https://medicinalplants.site/bot)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    pub user_agent: String,
    pub feed_timeout_secs: u64,
    pub page_timeout_secs: u64,
}

impl FetchSettings {
    pub fn timeout_for(&self, kind: SourceKind) -> Duration {
        match kind {
            SourceKind::Feed => Duration::from_secs(self.feed_timeout_secs),
            SourceKind::Page | SourceKind::Synthetic => Duration::from_secs(self.page_timeout_secs),
        }
    }
}

/// One bounded read of a source. Failures are reported inside `RawFetch`,
/// never as an `Err`; retrying is the caller's business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> RawFetch;
}

pub struct HttpFetcher {
    client: Client,
    settings: FetchSettings,
    clock: Arc<dyn Clock>,
}

impl HttpFetcher {
    pub fn new(settings: FetchSettings, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            settings,
            clock,
        })
    }

    fn now_unix(&self) -> u64 {
        self.clock.unix().max(0) as u64
    }

    async fn fetch_http(&self, source: &Source) -> Result<Vec<u8>, FetchError> {
        let locator = source.locator.clone();
        if !(locator.starts_with("http://") || locator.starts_with("https://")) {
            return Err(FetchError::UnsupportedLocator(locator));
        }
        let timeout = self.settings.timeout_for(source.kind);
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    locator: locator.clone(),
                    secs: timeout.as_secs(),
                }
            } else {
                FetchError::Network {
                    locator: locator.clone(),
                    reason: e.to_string(),
                }
            }
        };

        let resp = self
            .client
            .get(&source.locator)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                locator: locator.clone(),
                status: status.as_u16(),
            });
        }

        // `.text()` decodes the declared charset, so bodies reach the
        // extractor as UTF-8.
        let text = resp.text().await.map_err(classify)?;
        Ok(text.into_bytes())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> RawFetch {
        let t0 = std::time::Instant::now();
        let result = match source.kind {
            SourceKind::Synthetic => synthetic::render(&source.locator)
                .map(String::into_bytes)
                .ok_or_else(|| FetchError::UnsupportedLocator(source.locator.clone())),
            SourceKind::Feed | SourceKind::Page => self.fetch_http(source).await,
        };
        histogram!("collector_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let now = self.now_unix();
        match result {
            Ok(body) => RawFetch::ok(source, body, now),
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "fetch failed");
                counter!("collector_source_errors_total").increment(1);
                RawFetch::failed(source, e, now)
            }
        }
    }
}

/// Built-in headline digest served for `synthetic:` locators, so a
/// deployment always has one source that needs no network.
pub mod synthetic {
    pub const MARKET_DIGEST_LOCATOR: &str = "synthetic:market-digest";

    pub const MARKET_DIGEST: &[(&str, &str)] = &[
        (
            "Medicinal Plant Market Reaches $410B in Global Valuation",
            "https://example.com/1",
        ),
        (
            "Herbal Medicine Industry Shows 8.1% CAGR Growth",
            "https://example.com/2",
        ),
        (
            "Aromatic Plants Export Market Expands to Europe",
            "https://example.com/3",
        ),
        (
            "New Research on Essential Oil Therapeutic Properties",
            "https://example.com/4",
        ),
        (
            "Investment Opportunities in Plant-Based Pharmaceuticals",
            "https://example.com/5",
        ),
    ];

    /// Render the digest named by `locator` as a small HTML page, or `None`
    /// for an unknown digest.
    pub fn render(locator: &str) -> Option<String> {
        if locator != MARKET_DIGEST_LOCATOR {
            return None;
        }
        let mut html = String::from("<html><body>\n");
        for (title, url) in MARKET_DIGEST {
            html.push_str(&format!(
                "<article><h2><a href=\"{}\">{}</a></h2></article>\n",
                html_escape::encode_double_quoted_attribute(url),
                html_escape::encode_text(title)
            ));
        }
        html.push_str("</body></html>\n");
        Some(html)
    }
}
