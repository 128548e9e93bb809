//! Relevance scoring.
//!
//! score = clamp(Σ weight(class) × distinct_hits(class) / normalizer, 0, 1)
//!
//! Titles whose raw sum exceeds the normalizer saturate at 1.0. The result is
//! rounded to four decimals so persisted scores compare stably.

use super::{KeywordTable, RuleSet};
use crate::ingest::types::Category;

#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceScorer {
    table: KeywordTable,
    rules: RuleSet,
}

impl RelevanceScorer {
    pub fn new(table: KeywordTable, rules: RuleSet) -> Self {
        Self {
            table: table.lowercased(),
            rules: rules.lowercased(),
        }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    pub fn score(&self, title: &str) -> f64 {
        let lowered = title.to_lowercase();
        let denom = self.table.normalizer.max(1e-6);
        round4((self.table.raw_sum(&lowered) / denom).clamp(0.0, 1.0))
    }

    pub fn categorize(&self, title: &str) -> Category {
        self.rules.categorize(title)
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
