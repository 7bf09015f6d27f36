//! Call-sequence construction and approximate order value (§4.6, §4.7).

use rand::seq::SliceRandom;

use crate::domain::enums::{CallSeqType, Direction, SizeType};
use crate::numeric::insert_argsort;
use crate::rng::RngHierarchy;

/// Builds a `bars x cols` call sequence from `call_seq_type`, one group at a
/// time. `Auto` is not built here: it is re-sorted every bar from live order
/// values by [`auto_sort_group_row`].
pub fn build_call_seq(call_seq_type: CallSeqType, bars: usize, group_lens: &[usize], master_seed: u64) -> Vec<Vec<i64>> {
    let cols: usize = group_lens.iter().sum();
    let mut rows = Vec::with_capacity(bars);
    for bar in 0..bars {
        let mut row = vec![0i64; cols];
        let mut start = 0usize;
        for &len in group_lens {
            match call_seq_type {
                CallSeqType::Default | CallSeqType::Auto => {
                    for (k, slot) in row[start..start + len].iter_mut().enumerate() {
                        *slot = k as i64;
                    }
                }
                CallSeqType::Reversed => {
                    for (k, slot) in row[start..start + len].iter_mut().enumerate() {
                        *slot = (len - 1 - k) as i64;
                    }
                }
                CallSeqType::Random => {
                    let mut perm: Vec<i64> = (0..len as i64).collect();
                    shuffle_deterministic(&mut perm, master_seed, bar, start);
                    row[start..start + len].copy_from_slice(&perm);
                }
            }
            start += len;
        }
        rows.push(row);
    }
    rows
}

/// Shuffle seeded by `(master_seed, bar, group_start)` so `CallSeqType::Random`
/// is reproducible without threading an RNG handle through the driver for
/// this one-off construction step. Sub-seed derivation reuses [`RngHierarchy`]
/// (group slot keyed by `group_start`, iteration keyed by `bar`).
fn shuffle_deterministic(perm: &mut [i64], master_seed: u64, bar: usize, group_start: usize) {
    let mut rng = RngHierarchy::new(master_seed).rng_for(group_start, bar as u64);
    perm.shuffle(&mut rng);
}

/// Approximate, no-execution order value used to sort a group's call
/// sequence ascending (sells before buys) when `auto_call_seq` is set.
#[allow(clippy::too_many_arguments)]
pub fn approx_order_value(
    size: f64,
    size_type: SizeType,
    direction: Direction,
    asset_value: f64,
    val_price: f64,
    cash: f64,
    free_cash: f64,
    group_value: f64,
) -> f64 {
    match size_type {
        SizeType::Amount => size * val_price,
        SizeType::Value => size,
        SizeType::Percent => {
            if size >= 0.0 {
                size * cash
            } else if matches!(direction, Direction::LongOnly) {
                size * asset_value
            } else {
                size * (2.0 * asset_value.max(0.0) + free_cash.max(0.0))
            }
        }
        SizeType::TargetAmount => size * val_price - asset_value,
        SizeType::TargetValue => size - asset_value,
        SizeType::TargetPercent => size * group_value - asset_value,
    }
}

/// Re-sorts one group's call-sequence row ascending by `values`, preserving
/// the permutation invariant.
pub fn auto_sort_group_row(row: &mut [i64], values: &[f64]) {
    debug_assert_eq!(row.len(), values.len());
    let mut indices: Vec<usize> = row.iter().map(|&v| v as usize).collect();
    insert_argsort(values, &mut indices);
    for (slot, v) in row.iter_mut().zip(indices) {
        *slot = v as i64;
    }
}
