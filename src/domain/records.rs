//! Flat, append-only record types written by the simulation drivers.

use serde::{Deserialize, Serialize};

use super::enums::OrderSide;
use super::order::OrderRequest;
use super::state::OrderResult;

/// One row per fill. `id` is column-local and monotonic (invariant 5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub col: i64,
    pub idx: i64,
    pub size: f64,
    pub price: f64,
    pub fees: f64,
    pub side: OrderSide,
}

/// One row per logged attempt (filled or not), carrying a full audit trail:
/// the OHLC snapshot, pre-trade state, the request itself, post-trade state,
/// the result, and a back-reference to the order record it produced (`-1`
/// when the attempt did not result in a fill).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub group: i64,
    pub col: i64,
    pub idx: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub pre_cash: f64,
    pub pre_position: f64,
    pub pre_debt: f64,
    pub pre_free_cash: f64,
    pub pre_val_price: f64,
    pub pre_value: f64,
    pub request: OrderRequest,
    pub post_cash: f64,
    pub post_position: f64,
    pub post_debt: f64,
    pub post_free_cash: f64,
    pub post_val_price: f64,
    pub post_value: f64,
    pub result: OrderResult,
    pub order_id: i64,
}
