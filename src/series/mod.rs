//! Derived series (§4.9): per-bar asset flow, assets, cash flow (gross and
//! free), cash, value, asset return, market value, gross exposure, and
//! incremental total profit — all computed post-hoc from a column's
//! recorded fills, never tracked incrementally by the driver itself.

use crate::domain::enums::{Direction, OrderSide};
use crate::domain::records::{LogRecord, OrderRecord};

/// Per-bar signed transacted size, Buy positive / Sell negative, restricted
/// by `filter` to the long- or short-side book (determined from the fill's
/// resulting position sign in the log, since `OrderRecord` alone doesn't
/// carry pre/post state).
pub fn asset_flow(bars: usize, logs: &[LogRecord], filter: Direction) -> Vec<f64> {
    let mut out = vec![0.0; bars];
    for l in logs {
        if l.order_id < 0 {
            continue;
        }
        let dir_sign = if l.post_position != 0.0 {
            l.post_position.signum()
        } else {
            l.pre_position.signum()
        };
        let include = match filter {
            Direction::Both => true,
            Direction::LongOnly => dir_sign >= 0.0,
            Direction::ShortOnly => dir_sign <= 0.0,
        };
        if !include {
            continue;
        }
        out[l.idx as usize] += l.result.side.sign() * l.result.size;
    }
    out
}

/// Running sum of asset flow plus the initial position.
pub fn assets(flow: &[f64], init_position: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(flow.len());
    let mut running = init_position;
    for f in flow {
        running += f;
        out.push(running);
    }
    out
}

/// Non-free cash flow per bar: `-size * price * side - fees`, computed
/// straight off the flat order-record stream.
pub fn cash_flow_non_free(bars: usize, records: &[OrderRecord]) -> Vec<f64> {
    let mut out = vec![0.0; bars];
    for r in records {
        out[r.idx as usize] += -r.size * r.price * r.side.sign() - r.fees;
    }
    out
}

/// Free (debt-aware) cash flow per bar: the actual `cash` delta the
/// executor produced, which already accounts for short-debt financing.
pub fn cash_flow_free(bars: usize, logs: &[LogRecord]) -> Vec<f64> {
    let mut out = vec![0.0; bars];
    for l in logs {
        if l.order_id < 0 {
            continue;
        }
        out[l.idx as usize] += l.post_cash - l.pre_cash;
    }
    out
}

/// Cumulative cash balance from an initial balance and a per-bar flow.
pub fn cash(cash_flow: &[f64], init_cash: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(cash_flow.len());
    let mut running = init_cash;
    for f in cash_flow {
        running += f;
        out.push(running);
    }
    out
}

/// `value = cash + assets * close`.
pub fn value(cash: &[f64], assets: &[f64], close: &[f64]) -> Vec<f64> {
    cash.iter().zip(assets).zip(close).map(|((c, a), p)| c + a * p).collect()
}

fn bar_return(input: f64, output: f64) -> f64 {
    if input == 0.0 {
        0.0
    } else {
        (output - input) / input.abs()
    }
}

/// Per-bar asset return, handling the sign-change case (e.g. long flips to
/// short within one bar) separately from the ordinary case, which folds in
/// the bar's cash flow as an adjustment to the output asset value.
pub fn asset_return(assets: &[f64], close: &[f64], cash_flow: &[f64]) -> Vec<f64> {
    let n = assets.len();
    let av: Vec<f64> = assets.iter().zip(close).map(|(a, c)| a * c).collect();
    let mut out = vec![0.0; n];
    for i in 0..n {
        let input_av = if i == 0 { 0.0 } else { av[i - 1] };
        let output_av = av[i];
        if input_av != 0.0 && output_av != 0.0 && input_av.signum() != output_av.signum() {
            let base = input_av - output_av;
            out[i] = if base == 0.0 { 0.0 } else { (output_av - input_av) / base.abs() };
        } else {
            out[i] = bar_return(input_av, output_av + cash_flow[i]);
        }
    }
    out
}

/// Incremental total profit: `cash_end + assets_end * close_last - init_cash`.
pub fn total_profit(cash_end: f64, assets_end: f64, close_last: f64, init_cash: f64) -> f64 {
    cash_end + assets_end * close_last - init_cash
}

/// Buy-and-hold reference series: `init_value * close / close[0]`.
pub fn market_value(init_value: f64, close: &[f64]) -> Vec<f64> {
    let close0 = close.first().copied().unwrap_or(f64::NAN);
    close.iter().map(|c| init_value * c / close0).collect()
}

/// `asset_value / (asset_value + cash)`, zero when the denominator is zero.
pub fn gross_exposure(assets: &[f64], close: &[f64], cash: &[f64]) -> Vec<f64> {
    assets
        .iter()
        .zip(close)
        .zip(cash)
        .map(|((a, p), c)| {
            let av = a * p;
            let denom = av + c;
            if denom == 0.0 {
                0.0
            } else {
                av / denom
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::{OrderStatusInfo, SizeType};
    use crate::domain::order::OrderRequest;
    use crate::domain::state::OrderResult;

    fn order_rec(idx: i64, size: f64, price: f64, fees: f64, side: OrderSide) -> OrderRecord {
        OrderRecord { id: 0, col: 0, idx, size, price, fees, side }
    }

    fn log_rec(idx: i64, pre_position: f64, post_position: f64, pre_cash: f64, post_cash: f64, side: OrderSide, size: f64, price: f64) -> LogRecord {
        LogRecord {
            id: 0,
            group: 0,
            col: 0,
            idx,
            open: price,
            high: price,
            low: price,
            close: price,
            pre_cash,
            pre_position,
            pre_debt: 0.0,
            pre_free_cash: pre_cash,
            pre_val_price: price,
            pre_value: pre_cash + pre_position * price,
            request: OrderRequest::market(size, SizeType::Amount, crate::domain::enums::Direction::Both),
            post_cash,
            post_position,
            post_debt: 0.0,
            post_free_cash: post_cash,
            post_val_price: price,
            post_value: post_cash + post_position * price,
            result: OrderResult::filled(side, size, price, 0.0, OrderStatusInfo::None),
            order_id: 0,
        }
    }

    #[test]
    fn assets_accumulates_signed_flow() {
        let flow = vec![10.0, -4.0, 0.0];
        let out = assets(&flow, 0.0);
        assert_eq!(out, vec![10.0, 6.0, 6.0]);
    }

    #[test]
    fn cash_flow_non_free_matches_buy_and_sell_signs() {
        let recs = vec![order_rec(0, 10.0, 1.0, 0.1, OrderSide::Buy), order_rec(1, 10.0, 2.0, 0.1, OrderSide::Sell)];
        let flow = cash_flow_non_free(2, &recs);
        assert!((flow[0] - (-10.1)).abs() < 1e-9);
        assert!((flow[1] - 19.9).abs() < 1e-9);
    }

    #[test]
    fn gross_exposure_is_zero_when_flat() {
        let assets = vec![0.0];
        let close = vec![1.0];
        let cash = vec![0.0];
        assert_eq!(gross_exposure(&assets, &close, &cash), vec![0.0]);
    }

    #[test]
    fn market_value_tracks_close_ratio() {
        let close = vec![10.0, 20.0, 5.0];
        let mv = market_value(100.0, &close);
        assert_eq!(mv, vec![100.0, 200.0, 50.0]);
    }

    #[test]
    fn asset_flow_filters_by_resulting_direction() {
        let logs = vec![
            log_rec(0, 0.0, 10.0, 100.0, 90.0, OrderSide::Buy, 10.0, 1.0),
            log_rec(1, 10.0, 0.0, 90.0, 100.0, OrderSide::Sell, 10.0, 1.0),
        ];
        let long_flow = asset_flow(2, &logs, Direction::LongOnly);
        assert_eq!(long_flow[0], 10.0);
        let short_flow = asset_flow(2, &logs, Direction::ShortOnly);
        assert_eq!(short_flow, vec![0.0, 0.0]);
    }

    #[test]
    fn total_profit_matches_cash_and_final_asset_value() {
        let p = total_profit(90.0, 10.0, 2.0, 100.0);
        assert_eq!(p, 10.0); // 90 + 10*2 - 100
    }
}
