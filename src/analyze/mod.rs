// src/analyze/mod.rs
//! Relevance scoring and categorization, driven by data tables so alternate
//! rule sets can be injected.

pub mod rules;
pub mod scoring;
pub mod weights;

// Re-export convenient types.
pub use crate::analyze::rules::{CategoryRule, RuleSet};
pub use crate::analyze::scoring::RelevanceScorer;
pub use crate::analyze::weights::{KeywordClass, KeywordTable};

/// Count alphabetic words (letters, apostrophes, hyphens), ignoring numbers
/// and symbols such as `$410B` digits or `8.1%`.
pub fn word_count(title: &str) -> usize {
    static RE_WORD: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re = RE_WORD.get_or_init(|| regex::Regex::new(r"[\p{L}'-]+").unwrap());
    re.find_iter(title)
        .filter(|m| m.as_str().chars().any(char::is_alphabetic))
        .count()
}
