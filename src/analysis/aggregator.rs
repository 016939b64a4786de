//! Collateralization histogram aggregation.
//!
//! Turns minipool records into per-category histograms of borrowed ETH,
//! bucketed by the node's (capped) collateralization ratio.

use crate::error::{MinipoolError, Result};
use crate::models::{
    Aggregation, AggregationParams, CategoryStats, PoolRecord, UnknownCategoryPolicy,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Raw collateralization ratio as a fraction of borrowed ETH.
///
/// A stake equal to the minimum stake is worth `min_collat_percent` percent.
/// Returns `None` when the node has no minimum stake.
pub fn collateral_ratio(stake: u128, min_stake: u128, min_collat_percent: f64) -> Option<f64> {
    if min_stake == 0 {
        return None;
    }
    // Whole part divided in integers: wei amounts exceed f64 precision, and
    // an exact multiple of the minimum stake must land on its bucket boundary.
    let whole = (stake / min_stake) as f64;
    let fraction = (stake % min_stake) as f64 / min_stake as f64;
    Some((whole + fraction) * min_collat_percent / 100.0)
}

/// Ceiling above which collateral no longer counts as effective.
pub fn effective_cap(category: u64, borrowed: u64, multiplier: f64) -> f64 {
    multiplier * category as f64 / borrowed as f64
}

/// Bucket for a ratio, clamped to `last`.
pub fn bucket_index(ratio: f64, step: u32, last: usize) -> usize {
    // `as` saturates: NaN and negatives land in bucket 0.
    let index = (100.0 * ratio / f64::from(step)).floor() as usize;
    index.min(last)
}

/// Aggregate records into per-category statistics.
///
/// Every configured category is present in the result, even without data.
pub fn aggregate(records: &[PoolRecord], params: &AggregationParams) -> Result<Aggregation> {
    let mut stats: BTreeMap<u64, CategoryStats> = params
        .categories
        .iter()
        .map(|(&category, config)| {
            (
                category,
                CategoryStats::new(category, config, params.track_effective_metrics),
            )
        })
        .collect();
    let mut skipped_zero_min_stake = 0;
    let mut skipped_unknown: BTreeMap<u64, usize> = BTreeMap::new();

    for (index, record) in records.iter().enumerate() {
        let Some(raw) =
            collateral_ratio(record.stake, record.min_stake, params.min_collat_percent)
        else {
            skipped_zero_min_stake += 1;
            continue;
        };

        let (Some(config), Some(entry)) = (
            params.categories.get(&record.category),
            stats.get_mut(&record.category),
        ) else {
            match params.unknown_category {
                UnknownCategoryPolicy::Skip => {
                    debug!(
                        "Skipping minipool #{} with unknown category {}",
                        index, record.category
                    );
                    *skipped_unknown.entry(record.category).or_default() += 1;
                    continue;
                }
                UnknownCategoryPolicy::Abort => {
                    return Err(MinipoolError::InvalidCategory {
                        index,
                        category: record.category,
                    });
                }
            }
        };

        let borrowed = params.total_required_stake - record.category;
        entry.total_collateral_ratio += raw;
        entry.count += 1;

        let effective = raw.min(effective_cap(
            record.category,
            borrowed,
            params.effective_cap_multiplier,
        ));
        if let Some(total) = entry.total_effective_ratio.as_mut() {
            *total += effective;
        }

        let bucket = bucket_index(effective, config.step, config.last_bucket());
        entry.bucket_totals[bucket] += borrowed;
    }

    for (category, skipped) in &skipped_unknown {
        warn!(
            "Skipped {} minipool(s) with unconfigured deposit category {}",
            skipped, category
        );
    }
    if skipped_zero_min_stake > 0 {
        debug!(
            "Skipped {} minipool(s) with no minimum stake",
            skipped_zero_min_stake
        );
    }

    Ok(Aggregation {
        stats,
        skipped_zero_min_stake,
        skipped_unknown,
    })
}
