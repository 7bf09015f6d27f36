//! Positions (§4.8): either trade flavour collapsed by `parent_id` into one
//! row per continuous position, with size-weighted entry/exit prices,
//! summed fees, and recomputed pnl/return.

use std::collections::BTreeMap;

use crate::domain::trade::TradeRecord;

use super::ret;

/// Aggregates `trades` (entry-trade or exit-trade rows, same column) into
/// one position row per distinct `parent_id`, in ascending `parent_id` order.
pub fn build_positions(trades: &[TradeRecord]) -> Vec<TradeRecord> {
    let mut groups: BTreeMap<i64, Vec<&TradeRecord>> = BTreeMap::new();
    for t in trades {
        groups.entry(t.parent_id).or_default().push(t);
    }

    groups
        .into_iter()
        .map(|(parent_id, rows)| {
            let size: f64 = rows.iter().map(|r| r.size).sum();
            let entry_price = rows.iter().map(|r| r.entry_price * r.size).sum::<f64>() / size;
            let entry_fees: f64 = rows.iter().map(|r| r.entry_fees).sum();
            let exit_fees: f64 = rows.iter().map(|r| r.exit_fees).sum();

            let closed_size: f64 = rows.iter().filter(|r| r.status == crate::domain::enums::TradeStatus::Closed).map(|r| r.size).sum();
            let exit_price = if closed_size > 0.0 {
                rows.iter()
                    .filter(|r| r.status == crate::domain::enums::TradeStatus::Closed)
                    .map(|r| r.exit_price * r.size)
                    .sum::<f64>()
                    / closed_size
            } else {
                rows[0].exit_price
            };

            let status = if rows.iter().any(|r| r.status == crate::domain::enums::TradeStatus::Open) {
                crate::domain::enums::TradeStatus::Open
            } else {
                crate::domain::enums::TradeStatus::Closed
            };
            let direction = rows[0].direction;
            let entry_idx = rows.iter().map(|r| r.entry_idx).min().unwrap_or(-1);
            let exit_idx = rows.iter().map(|r| r.exit_idx).max().unwrap_or(-1);
            let pnl: f64 = rows.iter().map(|r| r.pnl).sum();

            TradeRecord {
                id: parent_id,
                col: rows[0].col,
                size,
                entry_idx,
                entry_price,
                entry_fees,
                exit_idx,
                exit_price,
                exit_fees,
                pnl,
                ret: ret(pnl, entry_price, size),
                direction,
                status,
                parent_id,
            }
        })
        .collect()
}
