//! The order executor: `execute_order(state, order, price_area) -> (new_state, result)`.
//!
//! Grounded on the multi-phase fill orchestration in `execution/fill_engine.rs`
//! and the state-transition style of `engine/order_book.rs` from the teacher
//! codebase, generalised from a discrete order book to the continuous,
//! cash/debt-aware size semantics this spec requires.

use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::enums::{Direction, OrderSide, OrderStatus, OrderStatusInfo, PriceAreaVioMode};
use crate::domain::order::{OrderRequest, PriceArea};
use crate::domain::state::{EarlyExit, ExecuteOrderState, OrderResult};
use crate::error::{InfeasibleOrderError, RejectedOrderError, SimError, StateError};
use crate::numeric;

use super::size::normalize_size;

/// Validates the order-request-level fields that are fatal regardless of
/// size/price resolution (§4.3 input validation).
fn validate_order_fields(order: &OrderRequest) -> Result<(), StateError> {
    if !(order.fees.is_finite() && order.fees >= 0.0)
        || !(order.fixed_fees.is_finite() && order.fixed_fees >= 0.0)
        || !(order.slippage.is_finite() && order.slippage >= 0.0)
    {
        return Err(StateError::InvalidFees);
    }
    if !(order.min_size.is_finite() && order.min_size >= 0.0) {
        return Err(StateError::InvalidSizeBounds);
    }
    if order.max_size.is_nan() || !(order.max_size > 0.0) {
        return Err(StateError::InvalidSizeBounds);
    }
    if !(order.size_granularity.is_nan() || (order.size_granularity.is_finite() && order.size_granularity > 0.0)) {
        return Err(StateError::InvalidGranularity);
    }
    if !(order.reject_prob.is_finite() && (0.0..=1.0).contains(&order.reject_prob)) {
        return Err(StateError::InvalidRejectProb);
    }
    Ok(())
}

fn validate_price_area(pa: &PriceArea) -> Result<(), StateError> {
    for v in [pa.open, pa.high, pa.low, pa.close] {
        if !(v.is_nan() || (v.is_finite() && v > 0.0)) {
            return Err(StateError::InvalidPriceArea(v));
        }
    }
    Ok(())
}

fn check_direction_consistency(direction: Direction, position: f64) -> Result<(), StateError> {
    match direction {
        Direction::LongOnly if position < 0.0 => Err(StateError::DirectionMismatch { direction }),
        Direction::ShortOnly if position > 0.0 => Err(StateError::DirectionMismatch { direction }),
        _ => Ok(()),
    }
}

/// Resolves `order.price` against the bar's price area: `+inf` => close
/// (`is_closing_price = true`), `-inf` => open, NaN propagates as an early
/// `Ignored(PriceNaN)`, anything else is used verbatim.
fn resolve_price(order_price: f64, pa: &PriceArea) -> Result<(f64, bool), EarlyExit> {
    let (price, is_closing) = if order_price == f64::INFINITY {
        (pa.close, true)
    } else if order_price == f64::NEG_INFINITY {
        (pa.open, false)
    } else {
        (order_price, false)
    };
    if price.is_nan() {
        return Err(EarlyExit::Ignored(OrderStatusInfo::PriceNaN));
    }
    Ok((price, is_closing))
}

fn apply_slippage(price: f64, slippage: f64, side: OrderSide) -> f64 {
    match side {
        OrderSide::Buy => price * (1.0 + slippage),
        OrderSide::Sell => price * (1.0 - slippage),
    }
}

/// Applies `price_area_vio_mode` to a slippage-adjusted price.
fn apply_price_area_mode(
    adj_price: f64,
    pa: &PriceArea,
    is_closing: bool,
    mode: PriceAreaVioMode,
) -> Result<f64, StateError> {
    let (low, high) = (pa.low, pa.high);
    let violates = adj_price < low || adj_price > high;
    match mode {
        PriceAreaVioMode::Ignore => Ok(adj_price),
        PriceAreaVioMode::Cap => {
            let mut p = adj_price.clamp(low, high);
            if is_closing {
                // A close-anchored order can't slip past the close it anchored to.
                p = p.clamp(low.min(pa.close), high.max(pa.close));
            }
            Ok(p)
        }
        PriceAreaVioMode::Error => {
            if violates {
                Err(StateError::PriceAreaViolation {
                    price: adj_price,
                    low,
                    high,
                })
            } else {
                Ok(adj_price)
            }
        }
    }
}

fn floor_to_granularity(size: f64, granularity: f64) -> f64 {
    if granularity.is_nan() || size.is_infinite() {
        size
    } else {
        (size / granularity).floor() * granularity
    }
}

struct FillOutcome {
    size: f64,
    fees: f64,
    status_info: OrderStatusInfo,
}

fn finalize_side(
    requested_abs: f64,
    candidate_abs: f64,
    price: f64,
    fee_rate: f64,
    fixed_fees: f64,
    order: &OrderRequest,
) -> Result<FillOutcome, EarlyExit> {
    let mut size = floor_to_granularity(candidate_abs, order.size_granularity);

    // max_size: an infinite requested size combined with an explicit finite
    // cap is the "infinite short/long hard cap" (SPEC_FULL §9) and is always
    // clamped; a finite requested size beyond max_size is a partial fill or
    // a hard rejection depending on allow_partial.
    if requested_abs.is_infinite() {
        if order.max_size.is_finite() {
            size = size.min(order.max_size);
        }
    } else if requested_abs > order.max_size {
        if order.allow_partial {
            size = size.min(order.max_size);
        } else {
            return Err(EarlyExit::Rejected(OrderStatusInfo::MaxSizeExceeded));
        }
    }

    if numeric::is_close(size, 0.0) || size <= 0.0 {
        return Err(EarlyExit::Ignored(OrderStatusInfo::SizeZero));
    }

    let fees = size * price * fee_rate + fixed_fees;

    if numeric::is_less(size, order.min_size) {
        return Err(EarlyExit::Rejected(OrderStatusInfo::MinSizeNotReached));
    }

    let mut status_info = OrderStatusInfo::None;
    if requested_abs.is_finite() && numeric::is_less(size, requested_abs) {
        if order.allow_partial {
            status_info = OrderStatusInfo::PartialFill;
        } else {
            return Err(EarlyExit::Rejected(OrderStatusInfo::PartialFill));
        }
    }

    Ok(FillOutcome {
        size,
        fees,
        status_info,
    })
}

fn execute_buy(
    state: &ExecuteOrderState,
    requested_abs: f64,
    percent: Option<f64>,
    price: f64,
    order: &OrderRequest,
) -> Result<(ExecuteOrderState, FillOutcome), EarlyExit> {
    // Debt is only ever nonzero while short, so `free_cash == cash` unless
    // this buy is covering one; covering releases the debt reservation,
    // collapsing the lock-cash limit back to the full cash balance.
    let mut limit = if !order.lock_cash {
        state.cash
    } else if state.position >= 0.0 {
        state.free_cash
    } else {
        state.cash
    };
    if let Some(p) = percent {
        limit *= p;
    }
    limit = limit.min(state.cash);

    let req_cash = requested_abs * price * (1.0 + order.fees) + order.fixed_fees;

    let candidate_abs = if req_cash.is_finite() && req_cash <= limit {
        requested_abs
    } else if limit.is_infinite() {
        // Unbounded requested size against unbounded cash with no cap:
        // `execute_order_checked` upgrades this to `InfeasibleOrderError`
        // when the caller has not set a finite `max_size`.
        return Err(EarlyExit::Rejected(OrderStatusInfo::NoCashLong));
    } else {
        let max_req_cash = (limit - order.fixed_fees) / (1.0 + order.fees);
        if max_req_cash <= 0.0 {
            return Err(EarlyExit::Rejected(OrderStatusInfo::CantCoverFees));
        }
        max_req_cash / price
    };

    let outcome = finalize_side(requested_abs, candidate_abs, price, order.fees, order.fixed_fees, order)?;

    let cover_size = outcome.size.min((-state.position).max(0.0));
    let avg_short_price = state.avg_short_entry_price();
    let debt_reduction = cover_size * avg_short_price;

    let new_cash = numeric::add(state.cash, -(outcome.size * price + outcome.fees));
    let new_position = state.position + outcome.size;
    let new_debt = (state.debt - debt_reduction).max(0.0);
    let new_state = ExecuteOrderState {
        cash: new_cash,
        position: new_position,
        debt: new_debt,
        free_cash: state.free_cash,
    }
    .recompute_free_cash();

    Ok((new_state, outcome))
}

fn execute_sell(
    state: &ExecuteOrderState,
    requested_abs: f64,
    percent: Option<f64>,
    price: f64,
    order: &OrderRequest,
) -> Result<(ExecuteOrderState, FillOutcome), EarlyExit> {
    let cash_locked = order.lock_cash || (requested_abs.is_infinite() && percent.is_some());

    let candidate_abs = if !cash_locked {
        requested_abs
    } else {
        let long_portion = state.position.max(0.0);
        let max_short_size = ((state.free_cash - order.fixed_fees) / (price * (1.0 + order.fees))).max(0.0);
        let max_sellable = long_portion + max_short_size;
        match percent {
            Some(p) => max_sellable * p,
            None => requested_abs.min(max_sellable),
        }
    };

    if candidate_abs.is_infinite() {
        // Unbounded short with no finite `max_size`: `execute_order_checked`
        // upgrades this to `InfeasibleOrderError` (SPEC_FULL §9's hard-cap
        // decision treats `max_size` as the opt-in bound).
        return Err(EarlyExit::Rejected(OrderStatusInfo::NoCashShort));
    }

    // Net proceeds must at least cover the fixed leg; the proportional fee
    // scales with size and is folded in by `finalize_side` via `fees`.
    let net_proceeds = candidate_abs * price * (1.0 - order.fees) - order.fixed_fees;
    if candidate_abs > 0.0 && net_proceeds <= 0.0 {
        return Err(EarlyExit::Rejected(OrderStatusInfo::CantCoverFees));
    }

    let outcome = finalize_side(requested_abs, candidate_abs, price, order.fees, order.fixed_fees, order)?;

    let prev_short = (-state.position).max(0.0);
    let new_position = state.position - outcome.size;
    let new_short = (-new_position).max(0.0);
    let short_added = (new_short - prev_short).max(0.0);
    let debt_increase = short_added * price;

    let new_cash = numeric::add(state.cash, outcome.size * price - outcome.fees);
    let new_debt = state.debt + debt_increase;
    let new_state = ExecuteOrderState {
        cash: new_cash,
        position: new_position,
        debt: new_debt,
        free_cash: state.free_cash,
    }
    .recompute_free_cash();

    Ok((new_state, outcome))
}

/// Samples the `reject_prob` random-reject gate from the caller's RNG
/// stream. Kept as a tiny seam so tests can stub determinism trivially by
/// passing `reject_prob = 0.0`.
fn sample_random_reject(reject_prob: f64, rng: &mut StdRng) -> bool {
    reject_prob > 0.0 && rng.gen::<f64>() < reject_prob
}

/// When the returned [`OrderResult`] is not `Filled`, the accompanying state
/// is a placeholder and must be discarded — callers keep their prior state.
pub fn execute_order(
    state: &ExecuteOrderState,
    order: &OrderRequest,
    price_area: &PriceArea,
    val_price: f64,
    group_value: f64,
    rng: &mut StdRng,
) -> Result<(ExecuteOrderState, OrderResult), SimError> {
    state.validate()?;
    validate_order_fields(order)?;
    validate_price_area(price_area)?;
    check_direction_consistency(order.direction, state.position)?;

    let (base_price, is_closing) = match resolve_price(order.price, price_area) {
        Ok(v) => v,
        Err(exit) => return Ok(finish_early(exit, order)),
    };
    if !(base_price.is_finite() && base_price > 0.0) {
        return Err(StateError::InvalidOrderPrice(base_price).into());
    }

    let normalized = match normalize_size(
        order.size,
        order.size_type,
        order.direction,
        state.position,
        val_price,
        group_value,
    ) {
        Ok(n) => n,
        Err(exit) => return Ok(finish_early(exit, order)),
    };

    let side = if normalized.size >= 0.0 {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };

    let adj_price = apply_slippage(base_price, order.slippage, side);
    let final_price = apply_price_area_mode(adj_price, price_area, is_closing, order.price_area_vio_mode)?;

    let requested_abs = normalized.size.abs();

    let branch_result = match side {
        OrderSide::Buy => execute_buy(state, requested_abs, normalized.percent, final_price, order),
        OrderSide::Sell => execute_sell(state, requested_abs, normalized.percent, final_price, order),
    };

    let (new_state, outcome) = match branch_result {
        Ok(v) => v,
        Err(exit) => return Ok(finish_early(exit, order)),
    };

    if numeric::is_close(outcome.size, 0.0) {
        return Ok(finish_early(EarlyExit::Ignored(OrderStatusInfo::SizeZero), order));
    }

    if sample_random_reject(order.reject_prob, rng) {
        let exit = EarlyExit::Rejected(OrderStatusInfo::RandomEvent);
        return Ok(finish_early(exit, order));
    }

    new_state.validate()?;

    let result = OrderResult::filled(side, outcome.size, final_price, outcome.fees, outcome.status_info);
    Ok((new_state, result))
}

fn finish_early(exit: EarlyExit, order: &OrderRequest) -> (ExecuteOrderState, OrderResult) {
    let side = if order.size >= 0.0 { OrderSide::Buy } else { OrderSide::Sell };
    (ExecuteOrderState::new(0.0, 0.0), exit.into_result(side))
}

/// Same as [`execute_order`] but converts a `Rejected` outcome into
/// [`RejectedOrderError`] when `order.raise_reject` is set, and converts an
/// unbounded infinite order with no finite limit anywhere into
/// [`InfeasibleOrderError`] rather than an ordinary rejection.
pub fn execute_order_checked(
    state: &ExecuteOrderState,
    order: &OrderRequest,
    price_area: &PriceArea,
    val_price: f64,
    group_value: f64,
    rng: &mut StdRng,
) -> Result<(ExecuteOrderState, OrderResult), SimError> {
    let (new_state, result) = execute_order(state, order, price_area, val_price, group_value, rng)?;
    if result.status == OrderStatus::Rejected {
        if matches!(
            result.status_info,
            OrderStatusInfo::NoCashLong | OrderStatusInfo::NoCashShort
        ) && order.size.is_infinite()
            && order.max_size.is_infinite()
        {
            let err = if order.size > 0.0 {
                InfeasibleOrderError::InfiniteLong
            } else {
                InfeasibleOrderError::InfiniteShort
            };
            return Err(err.into());
        }
        if order.raise_reject {
            return Err(RejectedOrderError::from_status_info(result.status_info).into());
        }
    }
    Ok((new_state, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::SizeType;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(1)
    }

    #[test]
    fn s1_buy_and_hold_bar0_fill() {
        let state = ExecuteOrderState::new(100.0, 0.0);
        let order = OrderRequest::market(f64::INFINITY, SizeType::Amount, Direction::LongOnly);
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 1.0, 100.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.side, OrderSide::Buy);
        assert!((result.size - 100.0).abs() < 1e-9);
        assert!(new_state.cash.abs() < 1e-9);
        assert_eq!(new_state.position, 100.0);
    }

    #[test]
    fn s2_stop_loss_sell_fill() {
        let state = ExecuteOrderState::new(0.0, 1.0);
        let mut order = OrderRequest::market(-1.0, SizeType::Amount, Direction::Both);
        order.price = 9.0;
        let pa = PriceArea::new(9.0, 10.0, 9.0, 9.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 9.0, 9.0, &mut rng()).unwrap();
        assert_eq!(result.side, OrderSide::Sell);
        assert!((result.size - 1.0).abs() < 1e-9);
        assert!((new_state.cash - 9.0).abs() < 1e-9);
        assert_eq!(new_state.position, 0.0);
    }

    #[test]
    fn s3_short_sell_creates_debt() {
        let state = ExecuteOrderState::new(100.0, 0.0);
        let order = OrderRequest::market(-1.0, SizeType::Amount, Direction::Both);
        let pa = PriceArea::new(10.0, 10.0, 10.0, 10.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 10.0, 100.0, &mut rng()).unwrap();
        assert_eq!(result.side, OrderSide::Sell);
        assert_eq!(new_state.position, -1.0);
        assert_eq!(new_state.cash, 110.0);
        assert_eq!(new_state.debt, 10.0);
        assert_eq!(new_state.free_cash, 100.0);
    }

    #[test]
    fn s3_buy_to_cover_clears_debt() {
        let state = ExecuteOrderState {
            cash: 110.0,
            position: -1.0,
            debt: 10.0,
            free_cash: 100.0,
        };
        let order = OrderRequest::market(1.0, SizeType::Amount, Direction::Both);
        let pa = PriceArea::new(9.0, 9.0, 9.0, 9.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 9.0, 100.0, &mut rng()).unwrap();
        assert_eq!(result.side, OrderSide::Buy);
        assert_eq!(new_state.position, 0.0);
        assert!((new_state.cash - 101.0).abs() < 1e-9);
        assert_eq!(new_state.debt, 0.0);
        assert!((new_state.free_cash - 101.0).abs() < 1e-9);
    }

    #[test]
    fn s5_partial_fill_with_fees() {
        let state = ExecuteOrderState::new(10.0, 0.0);
        let mut order = OrderRequest::market(100.0, SizeType::Amount, Direction::LongOnly);
        order.fees = 0.1;
        order.fixed_fees = 1.0;
        order.allow_partial = true;
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 1.0, 10.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.status_info, OrderStatusInfo::PartialFill);
        let expected_size = (10.0 - 1.0) / 1.1;
        assert!((result.size - expected_size).abs() < 1e-6);
        assert!(new_state.cash.abs() < 1e-6);
    }

    #[test]
    fn lock_cash_buy_covering_a_short_uses_full_cash_not_free_cash() {
        // Short 5 @ entry price 10 (debt 50), free_cash well below the full
        // cash needed to cover and flip long — lock_cash must still let the
        // covering leg through at the full cash limit, per the comment on
        // `execute_buy`'s `limit` branch.
        let state = ExecuteOrderState {
            cash: 110.0,
            position: -5.0,
            debt: 50.0,
            free_cash: 60.0,
        };
        let mut order = OrderRequest::market(10.0, SizeType::Amount, Direction::Both);
        order.lock_cash = true;
        let pa = PriceArea::new(10.0, 10.0, 10.0, 10.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 10.0, 110.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert!((result.size - 10.0).abs() < 1e-9, "lock_cash wrongly capped the covering buy to free_cash");
        assert_eq!(new_state.position, 5.0);
        assert_eq!(new_state.debt, 0.0);
    }

    #[test]
    fn infinite_percent_sell_implicitly_locks_cash_to_max_sellable() {
        // Long 5, flat cash 1000, no debt. An infinite Percent sell (100% of
        // capacity) implicitly cash-locks even with `lock_cash` left false.
        let state = ExecuteOrderState::new(1000.0, 5.0);
        let order = OrderRequest::market(f64::NEG_INFINITY, SizeType::Percent, Direction::Both);
        let pa = PriceArea::new(10.0, 10.0, 10.0, 10.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 10.0, 1000.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.side, OrderSide::Sell);
        // max_sellable = long_portion(5) + free_cash/price(100) = 105.
        assert!((result.size - 105.0).abs() < 1e-6);
        assert!((new_state.position - (-100.0)).abs() < 1e-6);
    }

    #[test]
    fn s6_granularity_floors_size() {
        let state = ExecuteOrderState::new(1000.0, 0.0);
        let mut order = OrderRequest::market(3.3, SizeType::Amount, Direction::LongOnly);
        order.size_granularity = 0.5;
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (_new_state, result) = execute_order(&state, &order, &pa, 1.0, 1000.0, &mut rng()).unwrap();
        assert!((result.size - 3.0).abs() < 1e-9);
    }

    #[test]
    fn s6_granularity_and_max_size_rejects_without_partial() {
        let state = ExecuteOrderState::new(1000.0, 0.0);
        let mut order = OrderRequest::market(3.3, SizeType::Amount, Direction::LongOnly);
        order.size_granularity = 0.5;
        order.max_size = 2.0;
        order.allow_partial = false;
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (_new_state, result) = execute_order(&state, &order, &pa, 1.0, 1000.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
        assert_eq!(result.status_info, OrderStatusInfo::MaxSizeExceeded);
    }

    #[test]
    fn size_zero_is_ignored() {
        let state = ExecuteOrderState::new(100.0, 0.0);
        let order = OrderRequest::market(0.0, SizeType::Amount, Direction::LongOnly);
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (_new_state, result) = execute_order(&state, &order, &pa, 1.0, 100.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Ignored);
        assert_eq!(result.status_info, OrderStatusInfo::SizeZero);
    }

    #[test]
    fn nan_price_is_ignored() {
        let state = ExecuteOrderState::new(100.0, 0.0);
        let mut order = OrderRequest::market(10.0, SizeType::Amount, Direction::LongOnly);
        order.price = f64::NAN;
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (_new_state, result) = execute_order(&state, &order, &pa, 1.0, 100.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Ignored);
        assert_eq!(result.status_info, OrderStatusInfo::PriceNaN);
    }

    #[test]
    fn raise_reject_turns_rejection_into_error() {
        let state = ExecuteOrderState::new(0.0, 0.0);
        let mut order = OrderRequest::market(10.0, SizeType::Amount, Direction::LongOnly);
        order.fixed_fees = 1.0;
        order.raise_reject = true;
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let err = execute_order_checked(&state, &order, &pa, 1.0, 0.0, &mut rng()).unwrap_err();
        assert!(matches!(err, SimError::RejectedOrder(_)));
    }

    #[test]
    fn random_reject_with_certainty() {
        let state = ExecuteOrderState::new(100.0, 0.0);
        let mut order = OrderRequest::market(10.0, SizeType::Amount, Direction::LongOnly);
        order.reject_prob = 1.0;
        let pa = PriceArea::new(1.0, 1.0, 1.0, 1.0);
        let (_new_state, result) = execute_order(&state, &order, &pa, 1.0, 100.0, &mut rng()).unwrap();
        assert_eq!(result.status, OrderStatus::Rejected);
        assert_eq!(result.status_info, OrderStatusInfo::RandomEvent);
    }

    #[test]
    fn cash_invariant_holds_on_buy() {
        let state = ExecuteOrderState::new(1000.0, 0.0);
        let order = OrderRequest::market(10.0, SizeType::Amount, Direction::LongOnly);
        let pa = PriceArea::new(5.0, 5.0, 5.0, 5.0);
        let (new_state, result) = execute_order(&state, &order, &pa, 5.0, 1000.0, &mut rng()).unwrap();
        let expected_cash = state.cash - result.side.sign() * result.size * result.price - result.fees;
        assert!((new_state.cash - expected_cash).abs() < 1e-9);
    }
}
