//! Generic callback driver (§4.6): exposes eight hook points around the
//! canonical per-bar spine, threading an opaque, caller-owned context `C`
//! per group. Grounded on the teacher's `engine/loop_runner.rs` hook table,
//! generalised from "one fixed hook" to the full pre/post ladder.
//!
//! `simulate` walks groups-outer/bars-inner and parallelises across groups;
//! `simulate_row_wise` walks bars-outer/groups-inner single-threaded. Per
//! the canonical spine both produce identical per-bar update ordering —
//! they differ only in loop nesting, never in semantics.

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::order::OrderRequest;
use crate::error::SimError;
use crate::rng::RngHierarchy;

use super::context::{ColumnMarket, SimConfig, Wallet};
use super::engine::{new_buffers, process_order, OhlcData, RunBuffers, SimulationOutput};

/// User-supplied functions at each of the eight spine hook points. All but
/// `order` are optional; a driver that doesn't need a hook simply omits it.
pub struct Hooks<'a, C> {
    pub pre_sim: Option<&'a (dyn Fn(&mut Vec<C>) + Sync)>,
    pub pre_group: Option<&'a (dyn Fn(&mut C, usize) + Sync)>,
    pub pre_segment: Option<&'a (dyn Fn(&mut C, usize, usize) + Sync)>,
    pub order: &'a (dyn Fn(&mut C, usize, usize) -> OrderRequest + Sync),
    pub post_order: Option<&'a (dyn Fn(&mut C, usize, usize) + Sync)>,
    pub post_segment: Option<&'a (dyn Fn(&mut C, usize, usize) + Sync)>,
    pub post_group: Option<&'a (dyn Fn(&mut C) + Sync)>,
    pub post_sim: Option<&'a (dyn Fn(&mut Vec<C>) + Sync)>,
}

/// Column-major: one context per group, groups run in parallel.
pub fn simulate<C: Send + Sync>(
    cfg: &SimConfig,
    prices: &OhlcData,
    hooks: &Hooks<C>,
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
        .map(|(group, ctx)| run_group_column_major(cfg, prices, hooks, ctx, group, bars, &rng_hierarchy, iteration))
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

/// Row-major: bars outer, groups inner, single context sequence shared
/// across the whole run (no group-level parallelism).
pub fn simulate_row_wise<C>(
    cfg: &SimConfig,
    prices: &OhlcData,
    hooks: &Hooks<C>,
    mut contexts: Vec<C>,
    iteration: u64,
) -> Result<(SimulationOutput, Vec<C>), SimError> {
    cfg.validate()?;
    if let Some(pre_sim) = hooks.pre_sim {
        pre_sim(&mut contexts);
    }

    let rng_hierarchy = RngHierarchy::new(cfg.master_seed);
    let bars = cfg.bars();
    let n_groups = cfg.n_groups();
    let cols = cfg.cols();

    let mut buffers = new_buffers(cfg);
    let mut markets: Vec<ColumnMarket> = (0..cols).map(|c| ColumnMarket::new(cfg.init_position.get(0, c, cfg.flex_2d), f64::NAN)).collect();
    let mut wallets: Vec<Wallet> = (0..n_groups)
        .map(|g| {
            let start = cfg.group_start(g);
            let len = cfg.group_lens[g];
            let init_cash = cfg.init_cash.get(0, start, cfg.flex_2d);
            let asset_value: f64 = (start..start + len).map(|c| markets[c].asset_value()).sum();
            Wallet::new(init_cash, asset_value)
        })
        .collect();
    let mut rngs: Vec<StdRng> = (0..n_groups).map(|g| rng_hierarchy.rng_for(g, iteration)).collect();

    for g in 0..n_groups {
        if let Some(pre_group) = hooks.pre_group {
            pre_group(&mut contexts[g], g);
        }
    }

    for bar in 0..bars {
        for group in 0..n_groups {
            let start = cfg.group_start(group);
            let len = cfg.group_lens[group];
            let active = cfg.segment_mask.get(bar, group, cfg.flex_2d) != 0.0;
            if !active {
                continue;
            }

            for col in start..start + len {
                let open = prices.open.get(bar, col, cfg.flex_2d);
                super::engine::refresh_val_price(&mut markets[col].val_price, open, cfg.ffill_val_price);
            }
            let group_value = wallets[group].cash + (start..start + len).map(|c| markets[c].asset_value()).sum::<f64>();

            if let Some(pre_segment) = hooks.pre_segment {
                pre_segment(&mut contexts[group], bar, group);
            }

            for col in start..start + len {
                let order = (hooks.order)(&mut contexts[group], bar, col);
                let pa = prices.price_area(bar, col, cfg.flex_2d);
                let group_debt_sum: f64 = (start..start + len).map(|c| markets[c].debt).sum();
                let market = &mut markets[col];
                process_order(
                    &mut buffers,
                    group,
                    col,
                    bar,
                    &order,
                    &pa,
                    &mut wallets[group],
                    market,
                    group_debt_sum,
                    group_value,
                    &mut rngs[group],
                )?;
                if let Some(post_order) = hooks.post_order {
                    post_order(&mut contexts[group], bar, col);
                }
            }

            if let Some(post_segment) = hooks.post_segment {
                post_segment(&mut contexts[group], bar, group);
            }

            for col in start..start + len {
                if cfg.update_value {
                    markets[col].val_price = prices.close.get(bar, col, cfg.flex_2d);
                }
            }
            wallets[group].prev_value = wallets[group].cash + (start..start + len).map(|c| markets[c].asset_value()).sum::<f64>();
        }
    }

    for g in 0..n_groups {
        if let Some(post_group) = hooks.post_group {
            post_group(&mut contexts[g]);
        }
    }
    if let Some(post_sim) = hooks.post_sim {
        post_sim(&mut contexts);
    }

    Ok((buffers.into_output(), contexts))
}

#[allow(clippy::too_many_arguments)]
fn run_group_column_major<C>(
    cfg: &SimConfig,
    prices: &OhlcData,
    hooks: &Hooks<C>,
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
    let mut rng = rng_hierarchy.rng_for(group, iteration);

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
        let group_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();

        if let Some(pre_segment) = hooks.pre_segment {
            pre_segment(ctx, bar, group);
        }

        for k in 0..len {
            let col = start + k;
            let order = (hooks.order)(ctx, bar, col);
            let pa = prices.price_area(bar, col, cfg.flex_2d);
            let group_debt_sum: f64 = markets.iter().map(|m| m.debt).sum();
            let market = &mut markets[k];
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::{Direction, SizeType};
    use crate::flex::FlexArray;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base_config() -> SimConfig {
        SimConfig {
            target_shape: (3, 1),
            group_lens: vec![1],
            cash_sharing: false,
            init_cash: FlexArray::scalar(100.0),
            init_position: FlexArray::scalar(0.0),
            call_seq_type: crate::domain::enums::CallSeqType::Default,
            call_seq: None,
            segment_mask: FlexArray::scalar(1.0),
            ffill_val_price: true,
            update_value: true,
            fill_pos_record: true,
            flex_2d: false,
            max_orders: None,
            max_logs: None,
            master_seed: 4,
        }
    }

    #[test]
    fn column_major_calls_post_order_once_per_order() {
        let cfg = base_config();
        let flat = vec![1.0, 1.0, 1.0];
        let prices = OhlcData {
            open: FlexArray::one_d(flat.clone()),
            high: FlexArray::one_d(flat.clone()),
            low: FlexArray::one_d(flat.clone()),
            close: FlexArray::one_d(flat),
        };
        let count = AtomicUsize::new(0);
        let order_fn = |_ctx: &mut (), bar: usize, _col: usize| {
            if bar == 0 {
                OrderRequest::market(10.0, SizeType::Amount, Direction::LongOnly)
            } else {
                let mut o = OrderRequest::market(0.0, SizeType::Amount, Direction::LongOnly);
                o.log = false;
                o
            }
        };
        let post_order = |_ctx: &mut (), _bar: usize, _col: usize| {
            count.fetch_add(1, Ordering::Relaxed);
        };
        let hooks = Hooks {
            pre_sim: None,
            pre_group: None,
            pre_segment: None,
            order: &order_fn,
            post_order: Some(&post_order),
            post_segment: None,
            post_group: None,
            post_sim: None,
        };
        let (out, _ctx) = simulate(&cfg, &prices, &hooks, vec![()], 0).unwrap();
        assert_eq!(out.order_records[0].len(), 1);
        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn row_wise_matches_column_major_fill() {
        let cfg = base_config();
        let flat = vec![1.0, 1.0, 1.0];
        let prices = OhlcData {
            open: FlexArray::one_d(flat.clone()),
            high: FlexArray::one_d(flat.clone()),
            low: FlexArray::one_d(flat.clone()),
            close: FlexArray::one_d(flat),
        };
        let order_fn = |_ctx: &mut (), bar: usize, _col: usize| {
            if bar == 0 {
                OrderRequest::market(10.0, SizeType::Amount, Direction::LongOnly)
            } else {
                let mut o = OrderRequest::market(0.0, SizeType::Amount, Direction::LongOnly);
                o.log = false;
                o
            }
        };
        let hooks = Hooks {
            pre_sim: None,
            pre_group: None,
            pre_segment: None,
            order: &order_fn,
            post_order: None,
            post_segment: None,
            post_group: None,
            post_sim: None,
        };
        let (out, _ctx) = simulate_row_wise(&cfg, &prices, &hooks, vec![()], 0).unwrap();
        assert_eq!(out.order_records[0].len(), 1);
        assert_eq!(out.order_records[0][0].size, 10.0);
    }
}
