//! Exit trades (§4.8): one row per exit fill (not per entry row), whose
//! entry side is the size-weighted average of whichever entries were still
//! open at the moment of that exit.

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

pub fn build_exit_trades(col: i64, records: &[OrderRecord], last_idx: i64, last_close: f64) -> Vec<TradeRecord> {
    let mut rows = Vec::new();
    let mut open: VecDeque<OpenEntry> = VecDeque::new();
    let mut next_row_id = 0i64;
    let mut next_position_id = 0i64;
    let mut position_dir: Option<TradeDirection> = None;
    let mut parent_id = -1i64;

    for rec in records {
        let side_dir = if rec.side == OrderSide::Buy { TradeDirection::Long } else { TradeDirection::Short };
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
                let mut weighted_entry_price = 0.0;
                let mut entry_fees_consumed = 0.0;
                let entry_idx_of_first = open.front().map(|e| e.entry_idx).unwrap_or(rec.idx);
                let mut consumed = 0.0;

                while remaining > SIZE_EPS {
                    let Some(mut entry) = open.pop_front() else { break };
                    let closed_size = remaining.min(entry.size);
                    weighted_entry_price += entry.entry_price * closed_size;
                    entry_fees_consumed += entry.fee_per_unit * closed_size;
                    consumed += closed_size;
                    remaining -= closed_size;
                    if closed_size < entry.size - SIZE_EPS {
                        entry.size -= closed_size;
                        open.push_front(entry);
                        break;
                    }
                }

                if consumed > SIZE_EPS {
                    let avg_entry_price = weighted_entry_price / consumed;
                    let exit_size_closed = consumed;
                    let entry_fees_prorated = entry_fees_consumed;
                    let exit_fees_alloc = rec.fees * (exit_size_closed / rec.size);
                    let row_pnl = pnl(avg_entry_price, rec.price, exit_size_closed, dir, entry_fees_prorated, exit_fees_alloc);
                    rows.push(TradeRecord {
                        id: next_row_id,
                        col,
                        size: exit_size_closed,
                        entry_idx: entry_idx_of_first,
                        entry_price: avg_entry_price,
                        entry_fees: entry_fees_prorated,
                        exit_idx: rec.idx,
                        exit_price: rec.price,
                        exit_fees: exit_fees_alloc,
                        pnl: row_pnl,
                        ret: ret(row_pnl, avg_entry_price, exit_size_closed),
                        direction: dir,
                        status: TradeStatus::Closed,
                        parent_id,
                    });
                    next_row_id += 1;
                }

                if remaining > SIZE_EPS {
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

    if let Some(dir) = position_dir {
        let remaining_size: f64 = open.iter().map(|e| e.size).sum();
        if remaining_size > SIZE_EPS {
            let weighted_entry_price: f64 = open.iter().map(|e| e.entry_price * e.size).sum::<f64>() / remaining_size;
            let entry_fees: f64 = open.iter().map(|e| e.fee_per_unit * e.size).sum();
            let entry_idx = open.front().map(|e| e.entry_idx).unwrap_or(last_idx);
            let row_pnl = pnl(weighted_entry_price, last_close, remaining_size, dir, entry_fees, 0.0);
            rows.push(TradeRecord {
                id: next_row_id,
                col,
                size: remaining_size,
                entry_idx,
                entry_price: weighted_entry_price,
                entry_fees,
                exit_idx: last_idx,
                exit_price: last_close,
                exit_fees: 0.0,
                pnl: row_pnl,
                ret: ret(row_pnl, weighted_entry_price, remaining_size),
                direction: dir,
                status: TradeStatus::Open,
                parent_id,
            });
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(idx: i64, size: f64, price: f64, fees: f64, side: OrderSide) -> OrderRecord {
        OrderRecord { id: idx, col: 0, idx, size, price, fees, side }
    }

    #[test]
    fn one_exit_fill_is_one_row_regardless_of_entry_count() {
        let recs = vec![
            rec(0, 5.0, 1.0, 0.0, OrderSide::Buy),
            rec(1, 5.0, 2.0, 0.0, OrderSide::Buy),
            rec(2, 10.0, 3.0, 0.0, OrderSide::Sell),
        ];
        let rows = build_exit_trades(0, &recs, 2, 3.0);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].entry_price - 1.5).abs() < 1e-9); // size-weighted avg of 1.0 and 2.0
    }

    #[test]
    fn open_remainder_reports_at_last_close() {
        let recs = vec![rec(0, 10.0, 1.0, 0.0, OrderSide::Buy), rec(1, 4.0, 2.0, 0.0, OrderSide::Sell)];
        let rows = build_exit_trades(0, &recs, 1, 2.5);
        assert_eq!(rows.len(), 2);
        let open_row = rows.iter().find(|r| r.status == TradeStatus::Open).unwrap();
        assert_eq!(open_row.size, 6.0);
        assert_eq!(open_row.exit_price, 2.5);
    }
}
