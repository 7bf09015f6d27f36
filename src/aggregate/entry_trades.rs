//! Entry trades (§4.8): one row per entry fill, FIFO-matched against the
//! exit fills that close it — an exit spanning several entry rows splits
//! across them, and an exit larger than the open position closes it and
//! opens a new, opposite one (a flip).

use std::collections::VecDeque;

use crate::domain::enums::{OrderSide, TradeDirection, TradeStatus};
use crate::domain::records::OrderRecord;
use crate::domain::trade::TradeRecord;

use super::{pnl, ret, SIZE_EPS};

struct OpenEntry {
    entry_idx: i64,
    entry_price: f64,
    fee_per_unit: f64,
    size: f64,
    parent_id: i64,
}

/// Builds entry-trade rows for one column's fill stream. `last_idx`/
/// `last_close` finalize any position still open at the end of the run.
pub fn build_entry_trades(col: i64, records: &[OrderRecord], last_idx: i64, last_close: f64) -> Vec<TradeRecord> {
    let mut rows = Vec::new();
    let mut open: VecDeque<OpenEntry> = VecDeque::new();
    let mut next_row_id = 0i64;
    let mut next_position_id = 0i64;
    let mut position_dir: Option<TradeDirection> = None;
    let mut parent_id = -1i64;

    for rec in records {
        let side_dir = side_to_direction(rec.side);
        match position_dir {
            None => {
                parent_id = next_position_id;
                next_position_id += 1;
                position_dir = Some(side_dir);
                open.push_back(push_open_entry(rec, parent_id));
            }
            Some(dir) if dir == side_dir => {
                open.push_back(push_open_entry(rec, parent_id));
            }
            Some(dir) => {
                let mut remaining = rec.size;
                while remaining > SIZE_EPS {
                    let Some(mut entry) = open.pop_front() else { break };
                    let closed_size = remaining.min(entry.size);
                    let exit_fee_alloc = rec.fees * (closed_size / rec.size);
                    let entry_fee_alloc = entry.fee_per_unit * closed_size;
                    let row_pnl = pnl(entry.entry_price, rec.price, closed_size, dir, entry_fee_alloc, exit_fee_alloc);
                    rows.push(TradeRecord {
                        id: next_row_id,
                        col,
                        size: closed_size,
                        entry_idx: entry.entry_idx,
                        entry_price: entry.entry_price,
                        entry_fees: entry_fee_alloc,
                        exit_idx: rec.idx,
                        exit_price: rec.price,
                        exit_fees: exit_fee_alloc,
                        pnl: row_pnl,
                        ret: ret(row_pnl, entry.entry_price, closed_size),
                        direction: dir,
                        status: TradeStatus::Closed,
                        parent_id: entry.parent_id,
                    });
                    next_row_id += 1;
                    remaining -= closed_size;
                    if closed_size < entry.size - SIZE_EPS {
                        entry.size -= closed_size;
                        open.push_front(entry);
                        break;
                    }
                }
                if remaining > SIZE_EPS {
                    // exit overshot the open position: flip to a new position
                    parent_id = next_position_id;
                    next_position_id += 1;
                    position_dir = Some(side_dir);
                    let flipped = OrderRecord {
                        size: remaining,
                        fees: rec.fees * (remaining / rec.size),
                        ..*rec
                    };
                    open.push_back(push_open_entry(&flipped, parent_id));
                } else if open.is_empty() {
                    position_dir = None;
                }
            }
        }
    }

    for entry in open {
        let dir = match position_dir {
            Some(d) => d,
            None => continue,
        };
        let row_pnl = pnl(entry.entry_price, last_close, entry.size, dir, entry.fee_per_unit * entry.size, 0.0);
        rows.push(TradeRecord {
            id: next_row_id,
            col,
            size: entry.size,
            entry_idx: entry.entry_idx,
            entry_price: entry.entry_price,
            entry_fees: entry.fee_per_unit * entry.size,
            exit_idx: last_idx,
            exit_price: last_close,
            exit_fees: 0.0,
            pnl: row_pnl,
            ret: ret(row_pnl, entry.entry_price, entry.size),
            direction: dir,
            status: TradeStatus::Open,
            parent_id: entry.parent_id,
        });
        next_row_id += 1;
    }

    rows
}

fn push_open_entry(rec: &OrderRecord, parent_id: i64) -> OpenEntry {
    OpenEntry {
        entry_idx: rec.idx,
        entry_price: rec.price,
        fee_per_unit: if rec.size != 0.0 { rec.fees / rec.size } else { 0.0 },
        size: rec.size,
        parent_id,
    }
}

fn side_to_direction(side: OrderSide) -> TradeDirection {
    match side {
        OrderSide::Buy => TradeDirection::Long,
        OrderSide::Sell => TradeDirection::Short,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(idx: i64, size: f64, price: f64, fees: f64, side: OrderSide) -> OrderRecord {
        OrderRecord { id: idx, col: 0, idx, size, price, fees, side }
    }

    #[test]
    fn single_buy_then_full_sell_closes_cleanly() {
        let recs = vec![rec(0, 10.0, 1.0, 0.0, OrderSide::Buy), rec(1, 10.0, 2.0, 0.0, OrderSide::Sell)];
        let rows = build_entry_trades(0, &recs, 1, 2.0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pnl, 10.0);
        assert_eq!(rows[0].status, TradeStatus::Closed);
    }

    #[test]
    fn open_position_finalizes_at_last_close() {
        let recs = vec![rec(0, 10.0, 1.0, 0.0, OrderSide::Buy)];
        let rows = build_entry_trades(0, &recs, 5, 1.5);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TradeStatus::Open);
        assert_eq!(rows[0].exit_price, 1.5);
        assert!((rows[0].pnl - 5.0).abs() < 1e-9);
    }

    #[test]
    fn partial_exit_splits_entry_row() {
        let recs = vec![rec(0, 10.0, 1.0, 0.0, OrderSide::Buy), rec(1, 4.0, 2.0, 0.0, OrderSide::Sell)];
        let rows = build_entry_trades(0, &recs, 1, 2.0);
        assert_eq!(rows.len(), 2); // one closed portion, one still-open remainder
        let closed = rows.iter().find(|r| r.status == TradeStatus::Closed).unwrap();
        assert_eq!(closed.size, 4.0);
        let open = rows.iter().find(|r| r.status == TradeStatus::Open).unwrap();
        assert_eq!(open.size, 6.0);
    }

    #[test]
    fn exit_overshoot_flips_to_new_position() {
        let recs = vec![
            rec(0, 10.0, 1.0, 0.0, OrderSide::Buy),
            rec(1, 15.0, 2.0, 0.0, OrderSide::Sell),
        ];
        let rows = build_entry_trades(0, &recs, 1, 2.0);
        assert_eq!(rows.len(), 2);
        let flipped = rows.iter().find(|r| r.direction == TradeDirection::Short).unwrap();
        assert_eq!(flipped.size, 5.0);
        assert_eq!(flipped.status, TradeStatus::Open);
    }
}
