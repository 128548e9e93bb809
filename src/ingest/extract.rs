// src/ingest/extract.rs
//! Headline extraction.
//!
//! Page bodies run through an ordered list of single-capture regex rules;
//! feed bodies go through the RSS parser. Every fragment is cleaned, then
//! accepted only if it is long enough, not a generic navigation label and
//! free of negative keywords. Accepted texts are deduplicated and capped per
//! source. Rule order only decides which texts survive the cap.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

use crate::error::ExtractionError;
use crate::ingest::feed;
use crate::ingest::normalize_text;
use crate::ingest::types::{Candidate, RawFetch, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    pub pattern: String, // regex; capture group 1 is the fragment
}

impl PatternRule {
    fn new(id: &str, pattern: &str) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSettings {
    pub min_length: usize,
    pub max_per_source: usize,
    pub denylist: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub noise_trailers: Vec<String>,
    pub rules: Vec<PatternRule>,
}

impl ExtractSettings {
    pub fn with_cap(max_per_source: usize) -> Self {
        Self {
            min_length: 10,
            max_per_source,
            denylist: ["Search", "News", "Home", "Index", "Topics"]
                .map(String::from)
                .to_vec(),
            negative_keywords: ["cooking", "recipe", "gardening", "landscaping", "decoration"]
                .map(String::from)
                .to_vec(),
            noise_trailers: ["- Google News", " | News", " - News", " News", "..."]
                .map(String::from)
                .to_vec(),
            rules: default_rules(),
        }
    }
}

pub fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new("heading", r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]\s*>"),
        PatternRule::new("titled_anchor", r#"(?is)<a\b[^>]*\btitle\s*=\s*"([^"]+)""#),
        PatternRule::new("document_title", r"(?is)<title\b[^>]*>(.*?)</title\s*>"),
        PatternRule::new(
            "title_div",
            r#"(?is)<div\b[^>]*class\s*=\s*"[^"]*title[^"]*"[^>]*>([^<]+)</div>"#,
        ),
        PatternRule::new(
            "headline_span",
            r#"(?is)<span\b[^>]*class\s*=\s*"[^"]*headline[^"]*"[^>]*>([^<]+)</span>"#,
        ),
    ]
}

/// Why a cleaned fragment was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    TooShort { chars: usize },
    Generic,
    NegativeKeyword(String),
}

#[derive(Debug)]
struct CompiledRule {
    id: String,
    re: Regex,
}

#[derive(Debug)]
pub struct Extractor {
    settings: ExtractSettings,
    rules: Vec<CompiledRule>,
    negative: Vec<String>, // lower-cased
}

struct Fragment<'a> {
    text: Cow<'a, str>,
    link: Option<String>,
    published_at: Option<u64>,
}

/// Lazy candidate sequence for one `RawFetch`. Call `Extractor::extract`
/// again to get an equivalent sequence.
pub struct Candidates<'a> {
    inner: Box<dyn Iterator<Item = Candidate> + 'a>,
}

impl Candidates<'_> {
    fn empty() -> Self {
        Self {
            inner: Box::new(std::iter::empty()),
        }
    }
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        self.inner.next()
    }
}

impl Extractor {
    pub fn new(settings: ExtractSettings) -> anyhow::Result<Self> {
        let rules = settings
            .rules
            .iter()
            .map(|r| {
                let re = Regex::new(&r.pattern)
                    .map_err(|e| anyhow::anyhow!("extract rule `{}` regex error: {}", r.id, e))?;
                if re.captures_len() < 2 {
                    anyhow::bail!("extract rule `{}` needs a capture group", r.id);
                }
                Ok(CompiledRule {
                    id: r.id.clone(),
                    re,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let negative = settings
            .negative_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            settings,
            rules,
            negative,
        })
    }

    pub fn settings(&self) -> &ExtractSettings {
        &self.settings
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.id.as_str())
    }

    /// Clean a raw fragment: normalize markup/entities/whitespace, then strip
    /// boilerplate trailers until none applies.
    pub fn clean(&self, fragment: &str) -> String {
        let mut out = normalize_text(fragment);
        loop {
            let before = out.len();
            for t in &self.settings.noise_trailers {
                if !t.is_empty() && out.ends_with(t.as_str()) {
                    out.truncate(out.len() - t.len());
                    out.truncate(out.trim_end().len());
                }
            }
            if out.len() == before {
                break;
            }
        }
        out
    }

    pub fn check(&self, cleaned: &str) -> Result<(), Rejection> {
        let chars = cleaned.chars().count();
        if chars < self.settings.min_length {
            return Err(Rejection::TooShort { chars });
        }
        if self
            .settings
            .denylist
            .iter()
            .any(|d| d.trim().eq_ignore_ascii_case(cleaned))
        {
            return Err(Rejection::Generic);
        }
        let lowered = cleaned.to_lowercase();
        if let Some(k) = self.negative.iter().find(|k| lowered.contains(k.as_str())) {
            return Err(Rejection::NegativeKeyword(k.clone()));
        }
        Ok(())
    }

    pub fn accepts(&self, cleaned: &str) -> bool {
        self.check(cleaned).is_ok()
    }

    pub fn extract<'a>(&'a self, raw: &'a RawFetch) -> Result<Candidates<'a>, ExtractionError> {
        let Some(bytes) = raw.body.as_deref() else {
            return Ok(Candidates::empty());
        };
        let source = &raw.source;
        let body = std::str::from_utf8(bytes).map_err(|e| ExtractionError::Encoding {
            source_name: source.name.clone(),
            reason: e.to_string(),
        })?;

        let fragments: Box<dyn Iterator<Item = Fragment<'a>> + 'a> = match source.kind {
            SourceKind::Feed => {
                let items = feed::parse_rss(body).map_err(|e| ExtractionError::Malformed {
                    source_name: source.name.clone(),
                    reason: e.to_string(),
                })?;
                Box::new(items.into_iter().map(|it| Fragment {
                    text: Cow::Owned(it.title),
                    link: it.link,
                    published_at: it.published_at,
                }))
            }
            SourceKind::Page | SourceKind::Synthetic => {
                Box::new(self.rules.iter().flat_map(move |rule| {
                    rule.re
                        .captures_iter(body)
                        .filter_map(|caps| caps.get(1))
                        .map(|m| Fragment {
                            text: Cow::Borrowed(m.as_str()),
                            link: None,
                            published_at: None,
                        })
                }))
            }
        };

        let fetched_at = raw.fetched_at;
        let mut seen: HashSet<String> = HashSet::new();
        let iter = fragments
            .filter_map(move |f| {
                let text = self.clean(&f.text);
                self.accepts(&text)
                    .then_some((text, f.link, f.published_at))
            })
            .filter(move |(text, _, _)| seen.insert(text.clone()))
            .take(self.settings.max_per_source)
            .map(move |(text, link, published_at)| Candidate {
                text,
                source_name: source.name.clone(),
                source_locator: link.unwrap_or_else(|| source.locator.clone()),
                observed_at: published_at.unwrap_or(fetched_at),
            });

        Ok(Candidates {
            inner: Box::new(iter),
        })
    }

    /// Eager form of `extract`.
    pub fn extract_all(&self, raw: &RawFetch) -> Result<Vec<Candidate>, ExtractionError> {
        Ok(self.extract(raw)?.collect())
    }
}
