//! Shared per-bar spine used by all four drivers (§4.6): val_price refresh,
//! group valuation, order execution plus record writing, and bounded-buffer
//! bookkeeping. Grounded on the teacher's `engine/loop_runner.rs` separation
//! between "the thing that walks bars" and "the thing that applies one
//! order", generalised here to the cash-sharing, multi-column case.

use rand::rngs::StdRng;

use crate::domain::enums::OrderStatus;
use crate::domain::order::{OrderRequest, PriceArea};
use crate::domain::records::{LogRecord, OrderRecord};
use crate::error::{CapacityError, SimError};
use crate::execution::execute_order_checked;
use crate::flex::FlexArray;

use crate::domain::state::ExecuteOrderState;

use super::context::{ColumnMarket, SimConfig, Wallet};

/// Broadcast OHLC price arrays read by the driver.
pub struct OhlcData {
    pub open: FlexArray,
    pub high: FlexArray,
    pub low: FlexArray,
    pub close: FlexArray,
}

impl OhlcData {
    pub fn price_area(&self, i: usize, col: usize, flex_2d: bool) -> PriceArea {
        PriceArea::new(
            self.open.get(i, col, flex_2d),
            self.high.get(i, col, flex_2d),
            self.low.get(i, col, flex_2d),
            self.close.get(i, col, flex_2d),
        )
    }
}

/// Final output of any driver entry point (§6).
#[derive(Debug, Clone, Default)]
pub struct SimulationOutput {
    pub order_records: Vec<Vec<OrderRecord>>,
    pub log_records: Vec<Vec<LogRecord>>,
}

/// Pre-allocated, column-major, capacity-bounded record buffers.
pub struct RunBuffers {
    pub order_records: Vec<Vec<OrderRecord>>,
    pub log_records: Vec<Vec<LogRecord>>,
    max_orders: usize,
    max_logs: usize,
    next_order_id: Vec<i64>,
    next_log_id: Vec<i64>,
}

impl RunBuffers {
    pub fn new(cols: usize, max_orders: usize, max_logs: usize) -> Self {
        Self {
            order_records: vec![Vec::new(); cols],
            log_records: vec![Vec::new(); cols],
            max_orders,
            max_logs,
            next_order_id: vec![0; cols],
            next_log_id: vec![0; cols],
        }
    }

    fn push_order(&mut self, col: usize, mut rec: OrderRecord) -> Result<i64, SimError> {
        if self.order_records[col].len() >= self.max_orders {
            return Err(CapacityError {
                column: "orders",
                col,
                capacity: self.max_orders,
            }
            .into());
        }
        let id = self.next_order_id[col];
        rec.id = id;
        self.order_records[col].push(rec);
        self.next_order_id[col] += 1;
        Ok(id)
    }

    fn push_log(&mut self, col: usize, mut rec: LogRecord) -> Result<(), SimError> {
        if self.log_records[col].len() >= self.max_logs {
            return Err(CapacityError {
                column: "logs",
                col,
                capacity: self.max_logs,
            }
            .into());
        }
        rec.id = self.next_log_id[col];
        self.log_records[col].push(rec);
        self.next_log_id[col] += 1;
        Ok(())
    }

    pub fn into_output(self) -> SimulationOutput {
        SimulationOutput {
            order_records: self.order_records,
            log_records: self.log_records,
        }
    }
}

pub fn new_buffers(cfg: &SimConfig) -> RunBuffers {
    RunBuffers::new(cfg.cols(), cfg.max_orders(), cfg.max_logs())
}

/// Refreshes `val_price` for one column at bar `i` per the §4.6 spine step 1:
/// `+inf` chases the close, `-inf` chases the open, any other order price
/// still marks against the open; ffill carries the previous value forward
/// across a NaN open when `ffill_val_price` is set.
pub fn refresh_val_price(val_price: &mut f64, open: f64, ffill: bool) {
    if open.is_nan() {
        if !ffill {
            *val_price = f64::NAN;
        }
    } else {
        *val_price = open;
    }
}

/// Executes one order against one column's market state and its wallet's
/// pooled cash, appends the order/log records (when `order.log` is set),
/// and writes the post-trade state back. `group_debt_sum` is the sum of
/// `debt` across every column sharing this wallet *before* this order,
/// used to derive this wallet's `free_cash`.
#[allow(clippy::too_many_arguments)]
pub fn process_order(
    buffers: &mut RunBuffers,
    group: usize,
    col: usize,
    bar: usize,
    order: &OrderRequest,
    price_area: &PriceArea,
    wallet: &mut Wallet,
    market: &mut ColumnMarket,
    group_debt_sum: f64,
    group_value: f64,
    rng: &mut StdRng,
) -> Result<(), SimError> {
    let pre = ExecuteOrderState {
        cash: wallet.cash,
        position: market.position,
        debt: market.debt,
        free_cash: wallet.cash - group_debt_sum,
    };

    let (new_state, result) = execute_order_checked(&pre, order, price_area, market.val_price, group_value, rng)?;

    let mut order_id = -1i64;
    if result.status == OrderStatus::Filled {
        wallet.cash = new_state.cash;
        market.position = new_state.position;
        market.debt = new_state.debt;
        order_id = buffers.push_order(
            col,
            OrderRecord {
                id: 0,
                col: col as i64,
                idx: bar as i64,
                size: result.size,
                price: result.price,
                fees: result.fees,
                side: result.side,
            },
        )?;
    }

    if order.log {
        buffers.push_log(
            col,
            LogRecord {
                id: 0,
                group: group as i64,
                col: col as i64,
                idx: bar as i64,
                open: price_area.open,
                high: price_area.high,
                low: price_area.low,
                close: price_area.close,
                pre_cash: pre.cash,
                pre_position: pre.position,
                pre_debt: pre.debt,
                pre_free_cash: pre.free_cash,
                pre_val_price: market.val_price,
                pre_value: pre.cash + market.asset_value(),
                request: order.clone(),
                post_cash: wallet.cash,
                post_position: market.position,
                post_debt: market.debt,
                post_free_cash: wallet.cash - market.debt,
                post_val_price: market.val_price,
                post_value: wallet.cash + market.asset_value(),
                result,
                order_id,
            },
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::{Direction, SizeType};
    use rand::SeedableRng;

    #[test]
    fn process_order_fills_and_records_buy() {
        let mut buffers = RunBuffers::new(1, 10, 10);
        let mut wallet = Wallet::new(100.0, 0.0);
        let mut market = ColumnMarket::new(0.0, 1.0);
        let order = OrderRequest::market(f64::INFINITY, SizeType::Amount, Direction::LongOnly);
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        process_order(&mut buffers, 0, 0, 0, &order, &pa, &mut wallet, &mut market, 0.0, 100.0, &mut rng).unwrap();
        assert_eq!(buffers.order_records[0].len(), 1);
        assert_eq!(buffers.log_records[0].len(), 1);
        assert!(wallet.cash.abs() < 1e-9);
        assert_eq!(market.position, 100.0);
    }

    #[test]
    fn process_order_logs_but_does_not_record_order_when_ignored() {
        let mut buffers = RunBuffers::new(1, 10, 10);
        let mut wallet = Wallet::new(100.0, 0.0);
        let mut market = ColumnMarket::new(0.0, 1.0);
        let order = OrderRequest::market(0.0, SizeType::Amount, Direction::LongOnly);
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        process_order(&mut buffers, 0, 0, 0, &order, &pa, &mut wallet, &mut market, 0.0, 100.0, &mut rng).unwrap();
        assert_eq!(buffers.order_records[0].len(), 0);
        assert_eq!(buffers.log_records[0].len(), 1);
        assert_eq!(buffers.log_records[0][0].order_id, -1);
    }

    #[test]
    fn capacity_exhaustion_is_fatal() {
        let mut buffers = RunBuffers::new(1, 1, 10);
        let mut wallet = Wallet::new(1000.0, 0.0);
        let mut market = ColumnMarket::new(0.0, 1.0);
        let order = OrderRequest::market(1.0, SizeType::Amount, Direction::LongOnly);
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        process_order(&mut buffers, 0, 0, 0, &order, &pa, &mut wallet, &mut market, 0.0, 1000.0, &mut rng).unwrap();
        let err =
            process_order(&mut buffers, 0, 0, 1, &order, &pa, &mut wallet, &mut market, 0.0, 1000.0, &mut rng).unwrap_err();
        assert!(matches!(err, SimError::Capacity(_)));
    }
}
