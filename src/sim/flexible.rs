//! Flexible driver (§4.6): like [`super::generic`] but the order function is
//! invoked repeatedly per active segment until it reports it has no more
//! orders to emit, rather than exactly once per column. Enables many orders
//! per cell and caller-chosen intra-segment ordering.

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::order::OrderRequest;
use crate::error::SimError;
use crate::rng::RngHierarchy;

use super::context::{ColumnMarket, SimConfig, Wallet};
use super::engine::{new_buffers, process_order, OhlcData, RunBuffers, SimulationOutput};

/// Returns the next `(column, order)` to execute this segment, or `None`
/// once the caller is done emitting orders for it.
pub type FlexOrderFn<'a, C> = dyn Fn(&mut C, usize, usize) -> Option<(usize, OrderRequest)> + Sync + 'a;

pub struct FlexHooks<'a, C> {
    pub pre_sim: Option<&'a (dyn Fn(&mut Vec<C>) + Sync)>,
    pub pre_group: Option<&'a (dyn Fn(&mut C, usize) + Sync)>,
    pub pre_segment: Option<&'a (dyn Fn(&mut C, usize, usize) + Sync)>,
    pub order: &'a FlexOrderFn<'a, C>,
    pub post_order: Option<&'a (dyn Fn(&mut C, usize, usize) + Sync)>,
    pub post_segment: Option<&'a (dyn Fn(&mut C, usize, usize) + Sync)>,
    pub post_group: Option<&'a (dyn Fn(&mut C) + Sync)>,
    pub post_sim: Option<&'a (dyn Fn(&mut Vec<C>) + Sync)>,
}

/// Caps the number of order-function calls per segment so a caller bug (an
/// order function that never returns `None`) can't spin the driver forever.
const MAX_ORDERS_PER_SEGMENT: usize = 1_000_000;

pub fn simulate_flexible<C: Send + Sync>(
    cfg: &SimConfig,
    prices: &OhlcData,
    hooks: &FlexHooks<C>,
    mut contexts: Vec<C>,
    iteration: u64,
) -> Result<(SimulationOutput, Vec<C>), SimError> {
    cfg.validate()?;
    if let Some(pre_sim) = hooks.pre_sim {
        pre_sim(&mut contexts);
    }

    let rng_hierarchy = RngHierarchy::new(cfg.master_seed);
    let bars = cfg.bars();

    let group_results: Vec<Result<RunBuffers, SimError>> = contexts
        .par_iter_mut()
        .enumerate()
        .map(|(group, ctx)| run_group(cfg, prices, hooks, ctx, group, bars, &rng_hierarchy, iteration))
        .collect();

    if let Some(post_sim) = hooks.post_sim {
        post_sim(&mut contexts);
    }

    let mut output = new_buffers(cfg).into_output();
    for r in group_results {
        let buffers = r?;
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
    Ok((output, contexts))
}

#[allow(clippy::too_many_arguments)]
fn run_group<C>(
    cfg: &SimConfig,
    prices: &OhlcData,
    hooks: &FlexHooks<C>,
    ctx: &mut C,
    group: usize,
    bars: usize,
    rng_hierarchy: &RngHierarchy,
    iteration: u64,
) -> Result<RunBuffers, SimError> {
    let start = cfg.group_start(group);
    let len = cfg.group_lens[group];
    let cols = cfg.cols();

    let mut buffers = RunBuffers::new(cols, cfg.max_orders(), cfg.max_logs());
    let mut rng: StdRng = rng_hierarchy.rng_for(group, iteration);

    let mut markets: Vec<ColumnMarket> = (start..start + len)
        .map(|c| ColumnMarket::new(cfg.init_position.get(0, c, cfg.flex_2d), f64::NAN))
        .collect();
    let init_cash = cfg.init_cash.get(0, start, cfg.flex_2d);
    let init_asset_value: f64 = markets.iter().map(ColumnMarket::asset_value).sum();
    let mut wallet = Wallet::new(init_cash, init_asset_value);

    if let Some(pre_group) = hooks.pre_group {
        pre_group(ctx, group);
    }

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

        if let Some(pre_segment) = hooks.pre_segment {
            pre_segment(ctx, bar, group);
        }

        for _ in 0..MAX_ORDERS_PER_SEGMENT {
            let group_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();
            let Some((local_col, order)) = (hooks.order)(ctx, bar, group) else {
                break;
            };
            let col = start + local_col;
            let pa = prices.price_area(bar, col, cfg.flex_2d);
            let group_debt_sum: f64 = markets.iter().map(|m| m.debt).sum();
            let market = &mut markets[local_col];
            process_order(&mut buffers, group, col, bar, &order, &pa, &mut wallet, market, group_debt_sum, group_value, &mut rng)?;
            if let Some(post_order) = hooks.post_order {
                post_order(ctx, bar, col);
            }
        }

        if let Some(post_segment) = hooks.post_segment {
            post_segment(ctx, bar, group);
        }

        for (k, market) in markets.iter_mut().enumerate() {
            let col = start + k;
            if cfg.update_value {
                market.val_price = prices.close.get(bar, col, cfg.flex_2d);
            }
        }
        wallet.prev_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();
    }

    if let Some(post_group) = hooks.post_group {
        post_group(ctx);
    }

    Ok(buffers)
}
