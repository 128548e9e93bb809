// src/config.rs
//! Collector configuration.
//!
//! Resolution order:
//! 1) built-in defaults of the selected `profile` (production | standard)
//! 2) `$COLLECTOR_CONFIG_PATH`, else `config/collector.toml`, deep-merged over 1)
//! 3) env overrides: `COLLECTOR_THRESHOLD`, `COLLECTOR_DATA_DIR`
//!
//! The result is an immutable value handed to components at construction.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analyze::{KeywordTable, RelevanceScorer, RuleSet};
use crate::ingest::fetch::DEFAULT_USER_AGENT;
use crate::ingest::registry::default_sources;
use crate::ingest::{ExtractSettings, FetchSettings, Source, SourceRegistry};
use crate::pipeline::PipelineSettings;

pub const ENV_CONFIG_PATH: &str = "COLLECTOR_CONFIG_PATH";
pub const ENV_THRESHOLD: &str = "COLLECTOR_THRESHOLD";
pub const ENV_DATA_DIR: &str = "COLLECTOR_DATA_DIR";
const DEFAULT_PATH: &str = "config/collector.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Production,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(flatten)]
    pub table: KeywordTable,
    pub categories: RuleSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// How often `serve` asks the scheduler whether a run is due.
    pub tick_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub profile: Profile,
    pub pipeline: PipelineSettings,
    pub fetch: FetchSettings,
    pub extract: ExtractSettings,
    pub scoring: ScoringConfig,
    pub sources: Vec<Source>,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::for_profile(Profile::default())
    }
}

impl CollectorConfig {
    pub fn for_profile(profile: Profile) -> Self {
        let (threshold, normalizer, per_source, delay, retries, page_timeout) = match profile {
            Profile::Production => (0.2, 2.0, 10, 3, 2, 15),
            Profile::Standard => (0.3, 3.0, 20, 2, 3, 30),
        };
        Self {
            profile,
            pipeline: PipelineSettings {
                relevance_threshold: threshold,
                max_items: 20,
                execution_budget_secs: 60,
                budget_reserve_secs: 10,
                request_delay_secs: delay,
                source_retries: retries,
            },
            fetch: FetchSettings {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                feed_timeout_secs: 15,
                page_timeout_secs: page_timeout,
            },
            extract: ExtractSettings::with_cap(per_source),
            scoring: ScoringConfig {
                table: KeywordTable::default_seed(normalizer),
                categories: RuleSet::default_seed(),
            },
            sources: default_sources(),
            storage: StorageConfig {
                dir: PathBuf::from("data"),
            },
            server: ServerConfig {
                bind: "0.0.0.0:8080".to_string(),
                tick_secs: 300,
            },
        }
    }

    /// Parse a TOML document and deep-merge it over the defaults of the
    /// profile it names. Tables merge key by key; arrays and scalars replace.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: toml::Table = toml::from_str(s).context("parsing collector config")?;
        let profile = match file.get("profile") {
            Some(v) => v
                .clone()
                .try_into::<Profile>()
                .map_err(|e| anyhow!("invalid profile: {e}"))?,
            None => Profile::default(),
        };

        let mut merged = toml::Value::try_from(Self::for_profile(profile))
            .context("serializing profile defaults")?;
        merge_value(&mut merged, toml::Value::Table(file));
        let cfg: Self = merged
            .try_into()
            .context("collector config does not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading collector config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load using env + fallbacks, then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_PATH);
            if pb.exists() {
                Self::load_from(&pb)?
            } else {
                Self::default()
            }
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// Apply `COLLECTOR_THRESHOLD` / `COLLECTOR_DATA_DIR` from `lookup`.
    /// An unparsable threshold is ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_THRESHOLD) {
            match raw.trim().parse::<f64>() {
                Ok(t) if t.is_finite() => self.pipeline.relevance_threshold = t.clamp(0.0, 1.0),
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", ENV_THRESHOLD),
            }
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            self.storage.dir = PathBuf::from(dir);
        }
    }

    fn validate(&self) -> Result<()> {
        let normalizer = self.scoring.table.normalizer;
        if normalizer.is_nan() || normalizer <= 0.0 {
            bail!("scoring.normalizer must be positive");
        }
        if !(0.0..=1.0).contains(&self.pipeline.relevance_threshold) {
            bail!("pipeline.relevance_threshold must be within [0, 1]");
        }
        if self.server.tick_secs == 0 {
            bail!("server.tick_secs must be at least 1");
        }
        Ok(())
    }

    pub fn registry(&self) -> SourceRegistry {
        SourceRegistry::new(self.sources.clone())
    }

    pub fn scorer(&self) -> RelevanceScorer {
        RelevanceScorer::new(self.scoring.table.clone(), self.scoring.categories.clone())
    }
}

/// Merge `overlay` into `base`: tables recurse, everything else replaces.
pub(crate) fn merge_value(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(b), toml::Value::Table(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(existing) => merge_value(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (b, o) => *b = o,
    }
}
