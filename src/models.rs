//! Data models for the collateralization histograms.
//!
//! This module contains the records read from the dataset, the per-category
//! bucket configuration, and the statistics computed from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One minipool, reduced to the values the histogram needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Node deposit in whole ETH (8 or 16 on mainnet).
    pub category: u64,
    /// RPL staked by the node, in wei.
    pub stake: u128,
    /// Minimum RPL stake required of the node, in wei.
    pub min_stake: u128,
}

/// Bucket layout of one category's histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Bucket width in percentage points.
    pub step: u32,
    /// Upper bound of the ratio axis in percent.
    pub max_ratio: u32,
}

impl CategoryConfig {
    /// Number of buckets, `0..=max_ratio/step`.
    pub fn bucket_count(&self) -> usize {
        (self.max_ratio / self.step) as usize + 1
    }

    /// Index of the last bucket, which also collects everything above it.
    pub fn last_bucket(&self) -> usize {
        self.bucket_count() - 1
    }
}

/// What to do with a record whose category has no configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCategoryPolicy {
    /// Count the record as skipped and keep going.
    #[default]
    Skip,
    /// Fail the aggregation.
    Abort,
}

impl fmt::Display for UnknownCategoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownCategoryPolicy::Skip => write!(f, "skip"),
            UnknownCategoryPolicy::Abort => write!(f, "abort"),
        }
    }
}

/// Parameters of one aggregation run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationParams {
    /// Bucket layout per deposit category.
    pub categories: BTreeMap<u64, CategoryConfig>,
    /// Minimum collateral, in percent of borrowed ETH, that a stake equal to
    /// `min_stake` represents.
    pub min_collat_percent: f64,
    /// ETH required per minipool; the part not deposited by the node is borrowed.
    pub total_required_stake: u64,
    /// Effective collateral is capped at `multiplier * category / borrowed`.
    pub effective_cap_multiplier: f64,
    /// Track the capped ratio total alongside the raw one.
    pub track_effective_metrics: bool,
    pub unknown_category: UnknownCategoryPolicy,
}

impl Default for AggregationParams {
    fn default() -> Self {
        Self {
            categories: [
                (
                    8,
                    CategoryConfig {
                        step: 1,
                        max_ratio: 50,
                    },
                ),
                (
                    16,
                    CategoryConfig {
                        step: 2,
                        max_ratio: 150,
                    },
                ),
            ]
            .into_iter()
            .collect(),
            min_collat_percent: 10.0,
            total_required_stake: 32,
            effective_cap_multiplier: 1.5,
            track_effective_metrics: true,
            unknown_category: UnknownCategoryPolicy::Skip,
        }
    }
}

/// Histogram and running totals for one deposit category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: u64,
    /// Bucket width in percentage points.
    pub step: u32,
    /// Borrowed ETH per bucket; index `i` covers `[i*step, (i+1)*step)` percent.
    pub bucket_totals: Vec<u64>,
    /// Number of contributing records.
    pub count: usize,
    /// Sum of uncapped ratios.
    pub total_collateral_ratio: f64,
    /// Sum of capped ratios, when effective metrics are tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_effective_ratio: Option<f64>,
}

impl CategoryStats {
    /// Creates empty stats with all buckets at zero.
    pub fn new(category: u64, config: &CategoryConfig, track_effective: bool) -> Self {
        Self {
            category,
            step: config.step,
            bucket_totals: vec![0; config.bucket_count()],
            count: 0,
            total_collateral_ratio: 0.0,
            total_effective_ratio: track_effective.then_some(0.0),
        }
    }

    /// Mean raw ratio in percent, or `None` without data.
    pub fn average(&self) -> Option<f64> {
        percent_mean(self.total_collateral_ratio, self.count)
    }

    /// Mean capped ratio in percent, or `None` without data or tracking.
    pub fn average_effective(&self) -> Option<f64> {
        self.total_effective_ratio
            .and_then(|total| percent_mean(total, self.count))
    }

    /// Total borrowed ETH across all buckets.
    pub fn total_borrowed(&self) -> u64 {
        self.bucket_totals.iter().sum()
    }

    /// First bucket holding any borrowed ETH.
    pub fn first_nonempty_bucket(&self) -> Option<usize> {
        self.bucket_totals.iter().position(|&total| total > 0)
    }

    /// `(bucket start in percent, borrowed ETH)` pairs from the first
    /// non-empty bucket to the last bucket. Empty when there is no data.
    pub fn series(&self) -> Vec<(u32, u64)> {
        let Some(start) = self.first_nonempty_bucket() else {
            return Vec::new();
        };

        self.bucket_totals
            .iter()
            .enumerate()
            .skip(start)
            .map(|(index, &total)| (index as u32 * self.step, total))
            .collect()
    }
}

fn percent_mean(total: f64, count: usize) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(100.0 * total / count as f64)
    }
}

/// Result of aggregating a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    /// One entry per configured category, including empty ones.
    pub stats: BTreeMap<u64, CategoryStats>,
    /// Records dropped because the node has no minimum stake.
    pub skipped_zero_min_stake: usize,
    /// Records dropped per unconfigured category.
    pub skipped_unknown: BTreeMap<u64, usize>,
}

impl Aggregation {
    /// Number of records that contributed to some category.
    pub fn contributing(&self) -> usize {
        self.stats.values().map(|s| s.count).sum()
    }

    /// Number of records skipped for an unknown category.
    pub fn skipped_unknown_total(&self) -> usize {
        self.skipped_unknown.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with(buckets: Vec<u64>, count: usize, total: f64) -> CategoryStats {
        CategoryStats {
            category: 8,
            step: 2,
            bucket_totals: buckets,
            count,
            total_collateral_ratio: total,
            total_effective_ratio: Some(total / 2.0),
        }
    }

    #[test]
    fn test_bucket_count() {
        let leb8 = CategoryConfig {
            step: 1,
            max_ratio: 50,
        };
        let leb16 = CategoryConfig {
            step: 2,
            max_ratio: 150,
        };
        assert_eq!(leb8.bucket_count(), 51);
        assert_eq!(leb16.bucket_count(), 76);
        assert_eq!(leb16.last_bucket(), 75);
    }

    #[test]
    fn test_new_stats_are_empty() {
        let config = CategoryConfig {
            step: 1,
            max_ratio: 50,
        };
        let stats = CategoryStats::new(8, &config, false);
        assert_eq!(stats.bucket_totals.len(), 51);
        assert_eq!(stats.total_borrowed(), 0);
        assert_eq!(stats.total_effective_ratio, None);
        assert_eq!(stats.average(), None);
        assert_eq!(stats.average_effective(), None);
        assert!(stats.series().is_empty());
    }

    #[test]
    fn test_averages() {
        let stats = stats_with(vec![0, 24, 24], 2, 0.3);
        assert!((stats.average().unwrap() - 15.0).abs() < 1e-9);
        assert!((stats.average_effective().unwrap() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_series_trims_leading_empty_buckets() {
        let stats = stats_with(vec![0, 0, 24, 0, 16], 2, 0.3);
        assert_eq!(stats.first_nonempty_bucket(), Some(2));
        assert_eq!(stats.series(), vec![(4, 24), (6, 0), (8, 16)]);
    }

    #[test]
    fn test_default_params() {
        let params = AggregationParams::default();
        assert_eq!(params.categories.len(), 2);
        assert_eq!(params.categories[&8].max_ratio, 50);
        assert_eq!(params.categories[&16].step, 2);
        assert_eq!(params.total_required_stake, 32);
        assert_eq!(params.unknown_category, UnknownCategoryPolicy::Skip);
    }
}
