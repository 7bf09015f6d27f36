//! **from-orders** driver (§4.6): one order request per column per active
//! segment, in call-sequence order, optionally auto-sorted by approximate
//! order value. Grounded on the teacher's `engine/loop_runner.rs` row walk,
//! generalised to groups and cash sharing.

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::enums::CallSeqType;
use crate::domain::order::OrderRequest;
use crate::error::SimError;
use crate::rng::RngHierarchy;

use super::call_seq::{approx_order_value, auto_sort_group_row, build_call_seq};
use super::context::{ColumnMarket, SimConfig, Wallet};
use super::engine::{new_buffers, process_order, OhlcData, RunBuffers, SimulationOutput};

/// Supplies the order to submit for one column at one bar. Implementations
/// must be side-effect free with respect to simulation state — the driver
/// owns all mutation.
pub trait OrderSource: Sync {
    fn order_at(&self, bar: usize, col: usize) -> OrderRequest;
}

impl<F: Fn(usize, usize) -> OrderRequest + Sync> OrderSource for F {
    fn order_at(&self, bar: usize, col: usize) -> OrderRequest {
        self(bar, col)
    }
}

/// Runs the from-orders driver to completion. `iteration` selects the RNG
/// sub-stream (distinct Monte-Carlo iterations of the same config get
/// independent, reproducible reject-probability draws).
pub fn simulate_from_orders(
    cfg: &SimConfig,
    prices: &OhlcData,
    orders: &dyn OrderSource,
    iteration: u64,
) -> Result<SimulationOutput, SimError> {
    cfg.validate()?;

    let auto_call_seq = matches!(cfg.call_seq_type, CallSeqType::Auto);
    let mut call_seq = cfg
        .call_seq
        .clone()
        .unwrap_or_else(|| build_call_seq(cfg.call_seq_type, cfg.bars(), &cfg.group_lens, cfg.master_seed));

    let rng_hierarchy = RngHierarchy::new(cfg.master_seed);
    let bars = cfg.bars();
    let n_groups = cfg.n_groups();

    let group_outputs: Vec<Result<(RunBuffers, usize), SimError>> = (0..n_groups)
        .into_par_iter()
        .map(|g| run_group(cfg, prices, orders, &mut call_seq.clone(), auto_call_seq, g, bars, &rng_hierarchy, iteration))
        .collect();

    merge_group_outputs(cfg, group_outputs)
}

#[allow(clippy::too_many_arguments)]
fn run_group(
    cfg: &SimConfig,
    prices: &OhlcData,
    orders: &dyn OrderSource,
    call_seq: &mut [Vec<i64>],
    auto_call_seq: bool,
    group: usize,
    bars: usize,
    rng_hierarchy: &RngHierarchy,
    iteration: u64,
) -> Result<(RunBuffers, usize), SimError> {
    let start = cfg.group_start(group);
    let len = cfg.group_lens[group];
    let cols = cfg.cols();

    let mut buffers = RunBuffers::new(cols, cfg.max_orders(), cfg.max_logs());
    let mut rng: StdRng = rng_hierarchy.rng_for(group, iteration);

    let mut markets: Vec<ColumnMarket> = (start..start + len)
        .map(|c| ColumnMarket::new(cfg.init_position.get(0, c, cfg.flex_2d), f64::NAN))
        .collect();
    let wallet_init_cash = cfg.init_cash.get(0, start, cfg.flex_2d);
    let init_asset_value: f64 = markets.iter().map(ColumnMarket::asset_value).sum();
    let mut wallet = Wallet::new(wallet_init_cash, init_asset_value);

    for bar in 0..bars {
        let active = cfg.segment_mask.get(bar, group, cfg.flex_2d) != 0.0;
        if !active {
            continue;
        }

        for (k, market) in markets.iter_mut().enumerate() {
            let col = start + k;
            let open = prices.open.get(bar, col, cfg.flex_2d);
            super::engine::refresh_val_price(&mut market.val_price, open, cfg.ffill_val_price);
        }

        let group_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();

        if auto_call_seq {
            let values: Vec<f64> = (start..start + len)
                .map(|col| {
                    let market = &markets[col - start];
                    let order = orders.order_at(bar, col);
                    approx_order_value(
                        order.size,
                        order.size_type,
                        order.direction,
                        market.asset_value(),
                        market.val_price,
                        wallet.cash,
                        wallet.cash - market.debt,
                        group_value,
                    )
                })
                .collect();
            auto_sort_group_row(&mut call_seq[bar][start..start + len], &values);
        }

        for k in 0..len {
            let local_col = call_seq[bar][start + k] as usize;
            let col = start + local_col;
            let market = &mut markets[local_col];
            let order = orders.order_at(bar, col);
            let pa = prices.price_area(bar, col, cfg.flex_2d);
            let group_debt_sum: f64 = markets.iter().map(|m| m.debt).sum();
            let market = &mut markets[local_col];
            process_order(&mut buffers, group, col, bar, &order, &pa, &mut wallet, market, group_debt_sum, group_value, &mut rng)?;
        }

        for (k, market) in markets.iter_mut().enumerate() {
            let col = start + k;
            let close = prices.close.get(bar, col, cfg.flex_2d);
            if cfg.update_value {
                market.val_price = close;
            }
        }
        wallet.prev_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();
    }

    Ok((buffers, group))
}

fn merge_group_outputs(cfg: &SimConfig, results: Vec<Result<(RunBuffers, usize), SimError>>) -> Result<SimulationOutput, SimError> {
    let mut output = new_buffers(cfg).into_output();
    for r in results {
        let (buffers, _group) = r?;
        let group_output = buffers.into_output();
        for (col, recs) in group_output.order_records.into_iter().enumerate() {
            if !recs.is_empty() {
                output.order_records[col] = recs;
            }
        }
        for (col, recs) in group_output.log_records.into_iter().enumerate() {
            if !recs.is_empty() {
                output.log_records[col] = recs;
            }
        }
    }
    Ok(output)
}
