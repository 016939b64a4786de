//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `.minipools.toml` files.

use crate::error::MinipoolError;
use crate::models::{AggregationParams, CategoryConfig, UnknownCategoryPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".minipools.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dataset source and cache settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Histogram settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Output settings.
    #[serde(default)]
    pub render: RenderConfig,
}

/// Where the dataset comes from and how long it is cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Dataset URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Local cache file.
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Hours before the cache is downloaded again.
    #[serde(default = "default_refresh_period_hours")]
    pub refresh_period_hours: f64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            cache_file: default_cache_file(),
            refresh_period_hours: default_refresh_period_hours(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl SourceConfig {
    /// Refresh period as a `Duration`.
    ///
    /// Fails for non-positive, non-finite or out-of-range hour counts.
    pub fn refresh_period(&self) -> std::result::Result<Duration, MinipoolError> {
        let hours = self.refresh_period_hours;
        if !(hours > 0.0) {
            return Err(MinipoolError::Config(
                "refresh_period_hours must be positive".to_string(),
            ));
        }
        Duration::try_from_secs_f64(hours * 3600.0).map_err(|_| {
            MinipoolError::Config(format!("refresh_period_hours {} is out of range", hours))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_url() -> String {
    "https://rocketscan.io/api/mainnet/minipools/all".to_string()
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("minipools.json.gz")
}

fn default_refresh_period_hours() -> f64 {
    23.0
}

fn default_timeout() -> u64 {
    120
}

/// One histogram's bucket layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// Node deposit in ETH.
    pub category: u64,
    /// Bucket width in percentage points.
    pub step: u32,
    /// Upper bound of the ratio axis in percent.
    pub max_ratio: u32,
}

/// Histogram settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Collateral percentage represented by the minimum stake.
    #[serde(default = "default_min_collat_percent")]
    pub min_collat_percent: f64,

    /// ETH per minipool.
    #[serde(default = "default_total_required_stake")]
    pub total_required_stake: u64,

    /// Effective collateral cap, as a multiple of `category / borrowed`.
    #[serde(default = "default_effective_cap_multiplier")]
    pub effective_cap_multiplier: f64,

    /// Track capped ratios alongside raw ones.
    #[serde(default = "default_true")]
    pub track_effective_metrics: bool,

    /// "skip" or "abort" on records with an unconfigured category.
    #[serde(default)]
    pub unknown_category: UnknownCategoryPolicy,

    /// Bucket layout per category.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryEntry>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_collat_percent: default_min_collat_percent(),
            total_required_stake: default_total_required_stake(),
            effective_cap_multiplier: default_effective_cap_multiplier(),
            track_effective_metrics: true,
            unknown_category: UnknownCategoryPolicy::Skip,
            categories: default_categories(),
        }
    }
}

fn default_min_collat_percent() -> f64 {
    10.0
}

fn default_total_required_stake() -> u64 {
    32
}

fn default_effective_cap_multiplier() -> f64 {
    1.5
}

fn default_categories() -> Vec<CategoryEntry> {
    vec![
        CategoryEntry {
            category: 8,
            step: 1,
            max_ratio: 50,
        },
        CategoryEntry {
            category: 16,
            step: 2,
            max_ratio: 150,
        },
    ]
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Directory receiving the charts and the page.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Page file name inside `output_dir`.
    #[serde(default = "default_page_file")]
    pub page_file: String,

    /// Source name shown on the page.
    #[serde(default = "default_source_label")]
    pub source_label: String,

    /// Draw the effective-average line too.
    #[serde(default)]
    pub show_effective_average: bool,

    #[serde(default = "default_light_color")]
    pub light_color: String,

    #[serde(default = "default_dark_color")]
    pub dark_color: String,

    /// Chart width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Chart height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            page_file: default_page_file(),
            source_label: default_source_label(),
            show_effective_average: false,
            light_color: default_light_color(),
            dark_color: default_dark_color(),
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_page_file() -> String {
    "index.html".to_string()
}

fn default_source_label() -> String {
    "rocketscan.io/api".to_string()
}

fn default_light_color() -> String {
    "#f7b852".to_string()
}

fn default_dark_color() -> String {
    "#fa9b02".to_string()
}

fn default_width() -> u32 {
    1500
}

fn default_height() -> u32 {
    400
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.url {
            self.source.url = url.clone();
        }
        if let Some(ref cache_file) = args.cache_file {
            self.source.cache_file = cache_file.clone();
        }
        if let Some(hours) = args.refresh_hours {
            self.source.refresh_period_hours = hours;
        }
        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }

        if args.strict {
            self.aggregation.unknown_category = UnknownCategoryPolicy::Abort;
        }

        if let Some(ref output_dir) = args.output_dir {
            self.render.output_dir = output_dir.clone();
        }
        if args.show_effective {
            self.aggregation.track_effective_metrics = true;
            self.render.show_effective_average = true;
        }
    }

    /// Check the configuration for values the aggregation cannot work with.
    pub fn validate(&self) -> std::result::Result<(), MinipoolError> {
        let invalid = |msg: String| -> std::result::Result<(), MinipoolError> {
            Err(MinipoolError::Config(msg))
        };

        self.source.refresh_period()?;
        if self.source.timeout_seconds == 0 {
            return invalid("timeout_seconds must be at least 1".to_string());
        }

        let aggregation = &self.aggregation;
        if !(aggregation.min_collat_percent > 0.0) {
            return invalid("min_collat_percent must be positive".to_string());
        }
        if !(aggregation.effective_cap_multiplier > 0.0) {
            return invalid("effective_cap_multiplier must be positive".to_string());
        }
        if aggregation.total_required_stake < 2 {
            return invalid("total_required_stake must be at least 2".to_string());
        }
        if aggregation.categories.is_empty() {
            return invalid("at least one category must be configured".to_string());
        }

        let mut seen = BTreeSet::new();
        for entry in &aggregation.categories {
            if entry.category == 0 || entry.category >= aggregation.total_required_stake {
                return invalid(format!(
                    "category {} must be between 1 and {}",
                    entry.category,
                    aggregation.total_required_stake.saturating_sub(1)
                ));
            }
            if entry.step == 0 {
                return invalid(format!("category {} has a zero step", entry.category));
            }
            if !seen.insert(entry.category) {
                return invalid(format!("category {} is configured twice", entry.category));
            }

            let borrowed = aggregation.total_required_stake - entry.category;
            let cap_percent = 100.0 * aggregation.effective_cap_multiplier * entry.category as f64
                / borrowed as f64;
            if cap_percent > f64::from(entry.max_ratio) {
                warn!(
                    "Category {}: effective cap {:.0}% exceeds max_ratio {}%, the last bucket will absorb the excess",
                    entry.category, cap_percent, entry.max_ratio
                );
            }
        }

        if self.render.width == 0 || self.render.height == 0 {
            return invalid("chart width and height must be positive".to_string());
        }

        Ok(())
    }

    /// Aggregation parameters derived from this configuration.
    pub fn aggregation_params(&self) -> AggregationParams {
        let aggregation = &self.aggregation;
        AggregationParams {
            categories: aggregation
                .categories
                .iter()
                .map(|entry| {
                    (
                        entry.category,
                        CategoryConfig {
                            step: entry.step,
                            max_ratio: entry.max_ratio,
                        },
                    )
                })
                .collect(),
            min_collat_percent: aggregation.min_collat_percent,
            total_required_stake: aggregation.total_required_stake,
            effective_cap_multiplier: aggregation.effective_cap_multiplier,
            track_effective_metrics: aggregation.track_effective_metrics,
            unknown_category: aggregation.unknown_category,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
