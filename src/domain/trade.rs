//! Shared record layout for entry trades, exit trades and positions (§3.2,
//! §4.8). All three aggregate flavours fill the same fields; only the
//! population rules differ (see `aggregate/`).

use serde::{Deserialize, Serialize};

use super::enums::{TradeDirection, TradeStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub col: i64,
    pub size: f64,
    pub entry_idx: i64,
    pub entry_price: f64,
    pub entry_fees: f64,
    /// `-1` while the position is open.
    pub exit_idx: i64,
    pub exit_price: f64,
    pub exit_fees: f64,
    pub pnl: f64,
    pub ret: f64,
    pub direction: TradeDirection,
    pub status: TradeStatus,
    /// Position-level grouping; equals `id` for position records themselves.
    pub parent_id: i64,
}

impl TradeRecord {
    /// `pnl = (exit - entry) * size * dir_sign - entry_fees - exit_fees`.
    pub fn compute_pnl(entry_price: f64, exit_price: f64, size: f64, direction: TradeDirection, entry_fees: f64, exit_fees: f64) -> f64 {
        (exit_price - entry_price) * size * direction.sign() - entry_fees - exit_fees
    }

    /// `return = pnl / (entry_price * size)`.
    pub fn compute_return(pnl: f64, entry_price: f64, size: f64) -> f64 {
        pnl / (entry_price * size)
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_pnl_positive_on_price_rise() {
        let pnl = TradeRecord::compute_pnl(10.0, 11.0, 1.0, TradeDirection::Long, 0.0, 0.0);
        assert_eq!(pnl, 1.0);
    }

    #[test]
    fn short_pnl_positive_on_price_fall() {
        let pnl = TradeRecord::compute_pnl(10.0, 9.0, 1.0, TradeDirection::Short, 0.0, 0.0);
        assert_eq!(pnl, 1.0);
    }

    #[test]
    fn fees_reduce_pnl() {
        let pnl = TradeRecord::compute_pnl(10.0, 11.0, 1.0, TradeDirection::Long, 0.1, 0.2);
        assert!((pnl - 0.7).abs() < 1e-12);
    }

    #[test]
    fn return_is_pnl_over_entry_notional() {
        let ret = TradeRecord::compute_return(1.0, 10.0, 1.0);
        assert!((ret - 0.1).abs() < 1e-12);
    }

    #[test]
    fn serde_roundtrip() {
        let t = TradeRecord {
            id: 0,
            col: 0,
            size: 1.0,
            entry_idx: 0,
            entry_price: 10.0,
            entry_fees: 0.0,
            exit_idx: 1,
            exit_price: 9.0,
            exit_fees: 0.0,
            pnl: -1.0,
            ret: -0.1,
            direction: TradeDirection::Long,
            status: TradeStatus::Closed,
            parent_id: 0,
        };
        let s = serde_json::to_string(&t).unwrap();
        let back: TradeRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(back.status, TradeStatus::Closed);
        assert!(back.is_winner() == false);
    }
}
