//! Ordered category rules. The first rule with any matching pattern decides
//! the category; a title matching none is `general`.

use serde::{Deserialize, Serialize};

use crate::ingest::types::Category;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub patterns: Vec<String>,
}

impl CategoryRule {
    fn new(category: Category, patterns: &[&str]) -> Self {
        Self {
            category,
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && lowered.contains(p.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    pub rules: Vec<CategoryRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn default_seed() -> Self {
        Self::new(vec![
            CategoryRule::new(Category::MarketAnalysis, &["market", "industry"]),
            CategoryRule::new(Category::Research, &["research", "study"]),
            CategoryRule::new(Category::Investment, &["investment", "funding"]),
            CategoryRule::new(Category::Regulatory, &["regulation", "policy"]),
        ])
    }

    pub fn lowercased(mut self) -> Self {
        for rule in &mut self.rules {
            for p in &mut rule.patterns {
                *p = p.to_lowercase();
            }
        }
        self
    }

    pub fn categorize(&self, title: &str) -> Category {
        let lowered = title.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lowered))
            .map(|r| r.category)
            .unwrap_or(Category::General)
    }
}
