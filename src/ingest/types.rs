// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Page,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub name: String,    // e.g., "Google News - Herbal Medicine"
    pub locator: String, // URL, or `synthetic:<id>`
    pub kind: SourceKind,
}

impl Source {
    pub fn new(name: impl Into<String>, locator: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            kind,
        }
    }
}

/// Outcome of one fetch attempt. Exactly one of `body` / `error` is set.
#[derive(Debug, Clone)]
pub struct RawFetch {
    pub source: Source,
    pub body: Option<Vec<u8>>,
    pub error: Option<FetchError>,
    pub fetched_at: u64, // unix seconds
}

impl RawFetch {
    pub fn ok(source: &Source, body: impl Into<Vec<u8>>, fetched_at: u64) -> Self {
        Self {
            source: source.clone(),
            body: Some(body.into()),
            error: None,
            fetched_at,
        }
    }

    pub fn failed(source: &Source, error: FetchError, fetched_at: u64) -> Self {
        Self {
            source: source.clone(),
            body: None,
            error: Some(error),
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub source_name: String,
    pub source_locator: String,
    pub observed_at: u64, // unix seconds
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    MarketAnalysis,
    Research,
    Investment,
    Regulatory,
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::MarketAnalysis => "market_analysis",
            Category::Research => "research",
            Category::Investment => "investment",
            Category::Regulatory => "regulatory",
            Category::General => "general",
        }
    }
}

/// The persisted unit of a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub title: String,
    pub source: String,
    pub url: String,
    pub timestamp: u64,
    pub relevance_score: f64,
    pub category: Category,
    pub word_count: usize,
    pub date_scraped: DateTime<Utc>,
}
