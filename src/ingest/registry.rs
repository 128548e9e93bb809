// src/ingest/registry.rs
//! Ordered source list. Registry order is also the tie-break order of the
//! snapshot: among equal scores, items from earlier sources rank first.

use crate::ingest::fetch::synthetic::MARKET_DIGEST_LOCATOR;
use crate::ingest::types::{Source, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Built-in seed used when no sources are configured.
    pub fn default_seed() -> Self {
        Self::new(default_sources())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}

pub fn default_sources() -> Vec<Source> {
    vec![
        Source::new(
            "RSS Business News",
            "https://feeds.reuters.com/reuters/businessNews",
            SourceKind::Feed,
        ),
        Source::new(
            "Google News - Medicinal Plants",
            "https://news.google.com/search?q=medicinal+plants+market",
            SourceKind::Page,
        ),
        Source::new(
            "Google News - Herbal Medicine",
            "https://news.google.com/search?q=herbal+medicine+industry",
            SourceKind::Page,
        ),
        Source::new(
            "Google News - Aromatic Plants",
            "https://news.google.com/search?q=aromatic+plants+business",
            SourceKind::Page,
        ),
        Source::new("Market Digest", MARKET_DIGEST_LOCATOR, SourceKind::Synthetic),
    ]
}
