//! Weighted keyword classes for relevance scoring.
//!
//! TOML shape (inside `[scoring]`):
//! ```toml
//! normalizer = 2.0
//! [[scoring.classes]]
//! name = "primary"
//! weight = 1.0
//! keywords = ["medicinal plant", "herbal medicine"]
//! ```
//!
//! Keywords are matched as lower-case substrings. Every distinct keyword that
//! matches contributes its class weight once.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordClass {
    pub name: String,
    pub weight: f64,
    pub keywords: Vec<String>,
}

impl KeywordClass {
    pub fn new(name: &str, weight: f64, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            weight,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Number of distinct keywords of this class found in `lowered`.
    pub fn hits(&self, lowered: &str) -> usize {
        let mut seen: Vec<&str> = Vec::new();
        for k in &self.keywords {
            if k.is_empty() || seen.contains(&k.as_str()) {
                continue;
            }
            if lowered.contains(k.as_str()) {
                seen.push(k);
            }
        }
        seen.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub normalizer: f64,
    pub classes: Vec<KeywordClass>,
}

impl KeywordTable {
    /// Built-in MAP keyword classes with the given normalizer.
    pub fn default_seed(normalizer: f64) -> Self {
        Self {
            normalizer,
            classes: vec![
                KeywordClass::new(
                    "primary",
                    1.0,
                    &[
                        "medicinal plant",
                        "aromatic plant",
                        "herbal medicine",
                        "plant medicine",
                        "botanical",
                        "phytotherapy",
                    ],
                ),
                KeywordClass::new(
                    "secondary",
                    0.6,
                    &[
                        "herbs",
                        "natural medicine",
                        "traditional medicine",
                        "plant extract",
                        "essential oil",
                        "nutraceutical",
                    ],
                ),
                KeywordClass::new(
                    "industry",
                    0.3,
                    &[
                        "market",
                        "industry",
                        "business",
                        "revenue",
                        "growth",
                        "investment",
                        "demand",
                        "supply",
                        "export",
                    ],
                ),
            ],
        }
    }

    /// Keywords lower-cased to match the lowered titles they are tested
    /// against. Tables read from config keep whatever case was written.
    pub fn lowercased(mut self) -> Self {
        for class in &mut self.classes {
            for k in &mut class.keywords {
                *k = k.to_lowercase();
            }
        }
        self
    }

    /// Unnormalized sum of class contributions.
    pub fn raw_sum(&self, lowered: &str) -> f64 {
        self.classes
            .iter()
            .map(|c| c.weight * c.hits(lowered) as f64)
            .sum()
    }
}
