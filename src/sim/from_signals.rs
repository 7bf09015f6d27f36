//! **from-signals** driver (§4.6): orders are derived each bar from the stop
//! state machine and the signal resolver instead of being supplied directly.
//! Grounded on the teacher's `engine/loop_runner.rs` spine, reusing the same
//! cash-sharing `Wallet`/`ColumnMarket` split as [`super::from_orders`].

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::enums::{CallSeqType, SizeType, StopEntryPrice, StopExitPrice, StopUpdateMode, TradeDirection};
use crate::domain::order::OrderRequest;
use crate::error::SimError;
use crate::rng::RngHierarchy;
use crate::signals::{resolve, synth_stop_signals, EntrySize, ResolverConfig, SignalSet};
use crate::stops::{resolve_entry_price, resolve_exit_price, StopState};

use super::call_seq::{approx_order_value, auto_sort_group_row, build_call_seq};
use super::context::{ColumnMarket, SimConfig, Wallet};
use super::engine::{new_buffers, process_order, OhlcData, RunBuffers, SimulationOutput};

/// Per-cell stop parameters a [`SignalSource`] supplies alongside its
/// entry/exit booleans; applied when a position is (re)armed or grown.
#[derive(Debug, Clone, Copy)]
pub struct StopParams {
    pub sl_stop: f64,
    pub sl_trail: bool,
    pub tp_stop: f64,
    pub stop_update_mode: StopUpdateMode,
}

/// Supplies per-cell signals, entry sizing, and stop parameters. Columns are
/// queried independently; implementations must not assume call order.
pub trait SignalSource: Sync {
    fn signals_at(&self, bar: usize, col: usize) -> SignalSet;
    fn entry_size_at(&self, bar: usize, col: usize) -> EntrySize;
    fn stop_params_at(&self, bar: usize, col: usize) -> StopParams;

    /// Optional per-column callback letting the caller tighten/loosen an
    /// already-armed stop before this bar's hit test runs. Default: no-op.
    fn adjust_stop(&self, _bar: usize, _col: usize, _stop: &mut StopState) {}
}

#[derive(Debug, Clone, Copy)]
pub struct SignalDriverConfig {
    pub resolver: ResolverConfig,
    pub stop_entry_price: StopEntryPrice,
    pub stop_exit_price: StopExitPrice,
    /// Price used to build non-stop orders (`+inf` = close, `-inf` = open).
    pub order_price: f64,
    pub slippage: f64,
}

pub fn simulate_from_signals(
    cfg: &SimConfig,
    prices: &OhlcData,
    signals: &dyn SignalSource,
    driver_cfg: &SignalDriverConfig,
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

    let group_outputs: Vec<Result<RunBuffers, SimError>> = (0..n_groups)
        .into_par_iter()
        .map(|g| {
            run_group(
                cfg,
                prices,
                signals,
                driver_cfg,
                &mut call_seq.clone(),
                auto_call_seq,
                g,
                bars,
                &rng_hierarchy,
                iteration,
            )
        })
        .collect();

    let mut output = new_buffers(cfg).into_output();
    for r in group_outputs {
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
    Ok(output)
}

struct Intent {
    order: Option<OrderRequest>,
}

#[allow(clippy::too_many_arguments)]
fn run_group(
    cfg: &SimConfig,
    prices: &OhlcData,
    signals: &dyn SignalSource,
    driver_cfg: &SignalDriverConfig,
    call_seq: &mut [Vec<i64>],
    auto_call_seq: bool,
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
    let mut stops: Vec<StopState> = vec![StopState::new(); len];
    for (k, market) in markets.iter().enumerate() {
        if market.position != 0.0 {
            let dir = if market.position > 0.0 { TradeDirection::Long } else { TradeDirection::Short };
            stops[k].arm(dir, -1, market.val_price, f64::NAN, false, f64::NAN);
        }
    }
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
            signals.adjust_stop(bar, col, &mut stops[k]);
        }

        let group_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();

        let mut intents: Vec<Intent> = Vec::with_capacity(len);
        for k in 0..len {
            let col = start + k;
            let pa = prices.price_area(bar, col, cfg.flex_2d);
            intents.push(build_intent(cfg, driver_cfg, signals, &stops[k], markets[k].position, bar, col, &pa));
        }

        if auto_call_seq {
            let values: Vec<f64> = intents
                .iter()
                .enumerate()
                .map(|(k, intent)| match &intent.order {
                    Some(o) => approx_order_value(
                        o.size,
                        o.size_type,
                        o.direction,
                        markets[k].asset_value(),
                        markets[k].val_price,
                        wallet.cash,
                        wallet.cash - markets[k].debt,
                        group_value,
                    ),
                    None => 0.0,
                })
                .collect();
            auto_sort_group_row(&mut call_seq[bar][start..start + len], &values);
        }

        for k in 0..len {
            let local_col = call_seq[bar][start + k] as usize;
            let col = start + local_col;
            let Some(order) = intents[local_col].order.take() else { continue };
            let pa = prices.price_area(bar, col, cfg.flex_2d);
            let pre_position = markets[local_col].position;
            let group_debt_sum: f64 = markets.iter().map(|m| m.debt).sum();
            let market = &mut markets[local_col];
            process_order(&mut buffers, group, col, bar, &order, &pa, &mut wallet, market, group_debt_sum, group_value, &mut rng)?;
            update_stop_after_fill(
                &mut stops[local_col],
                signals,
                driver_cfg,
                pre_position,
                market.position,
                bar,
                col,
                market.val_price,
                order.price,
                prices.close.get(bar, col, cfg.flex_2d),
            );
        }

        for (k, market) in markets.iter_mut().enumerate() {
            let col = start + k;
            let pa = prices.price_area(bar, col, cfg.flex_2d);
            stops[k].advance_trailing(bar as i64, &pa);
            let close = prices.close.get(bar, col, cfg.flex_2d);
            if cfg.update_value {
                market.val_price = close;
            }
        }
        wallet.prev_value = wallet.cash + markets.iter().map(ColumnMarket::asset_value).sum::<f64>();
    }

    Ok(buffers)
}

#[allow(clippy::too_many_arguments)]
fn build_intent(
    cfg: &SimConfig,
    driver_cfg: &SignalDriverConfig,
    signals: &dyn SignalSource,
    stop: &StopState,
    position: f64,
    bar: usize,
    col: usize,
    pa: &crate::domain::order::PriceArea,
) -> Intent {
    let _ = cfg;
    let position_direction = if position > 0.0 {
        Some(TradeDirection::Long)
    } else if position < 0.0 {
        Some(TradeDirection::Short)
    } else {
        None
    };

    let mut stop_hit_price = None;
    let stop_signals = if let Some(dir) = position_direction {
        if let Some(price) = stop.check_sl(pa) {
            stop_hit_price = Some(price);
            Some(synth_stop_signals(driver_cfg.resolver.upon_stop_exit, dir))
        } else if let Some(price) = stop.check_tp(pa) {
            stop_hit_price = Some(price);
            Some(synth_stop_signals(driver_cfg.resolver.upon_stop_exit, dir))
        } else {
            None
        }
    } else {
        None
    };

    let user_signals = signals.signals_at(bar, col);
    let entry = {
        let e = signals.entry_size_at(bar, col);
        EntrySize {
            size: e.size,
            size_type: e.size_type,
        }
    };

    let is_stop = stop_signals.is_some();
    let resolved = match resolve(stop_signals, user_signals, position, entry, driver_cfg.resolver) {
        Ok(r) => r,
        Err(_) => None,
    };

    let order = resolved.map(|(size, size_type, direction)| {
        let mut o = OrderRequest::market(size, size_type, direction);
        if is_stop {
            if let Some(stop_price) = stop_hit_price {
                o.price = resolve_exit_price(driver_cfg.stop_exit_price, stop_price, pa.close, driver_cfg.slippage, position_direction.unwrap());
            }
        } else {
            o.price = driver_cfg.order_price;
        }
        o
    });

    Intent { order }
}

#[allow(clippy::too_many_arguments)]
fn update_stop_after_fill(
    stop: &mut StopState,
    signals: &dyn SignalSource,
    driver_cfg: &SignalDriverConfig,
    pre_position: f64,
    post_position: f64,
    bar: usize,
    col: usize,
    val_price: f64,
    order_price: f64,
    close: f64,
) {
    if (post_position - pre_position).abs() < 1e-12 {
        return;
    }
    if post_position == 0.0 {
        stop.clear();
        return;
    }
    let new_dir = if post_position > 0.0 { TradeDirection::Long } else { TradeDirection::Short };
    let params = signals.stop_params_at(bar, col);
    let reversed = pre_position != 0.0 && pre_position.signum() != post_position.signum();
    if pre_position == 0.0 || reversed {
        let ref_price = resolve_entry_price(driver_cfg.stop_entry_price, val_price, order_price, order_price, close);
        stop.arm(new_dir, bar as i64, ref_price, params.sl_stop, params.sl_trail, params.tp_stop);
    } else if post_position.abs() > pre_position.abs() {
        stop.update_on_grow(params.sl_stop, params.tp_stop, params.stop_update_mode);
    }
}
