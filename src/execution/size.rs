//! Size-type normalisation pipeline (§4.3): collapses the six `SizeType`
//! variants down to a plain signed `Amount`, carrying forward an optional
//! "use this fraction of available capacity" percent for the buy/sell
//! branches to apply against their cash/position limit.

use crate::domain::enums::{Direction, OrderStatusInfo, SizeType};
use crate::domain::state::EarlyExit;

#[derive(Debug, Clone, Copy)]
pub struct NormalizedSize {
    /// Signed amount (shares/contracts); may be `+-inf` when `percent` is
    /// `Some` (meaning "this fraction of whatever the buy/sell branch can
    /// reach", not a literal infinite order).
    pub size: f64,
    pub percent: Option<f64>,
}

/// Runs steps 1-7 of §4.3 in order. `group_value` is the `TargetPercent`
/// base (the position's group or column value); `val_price` is the mark
/// used to convert `Value`/`TargetValue` into share counts.
pub fn normalize_size(
    size: f64,
    size_type: SizeType,
    direction: Direction,
    position: f64,
    val_price: f64,
    group_value: f64,
) -> Result<NormalizedSize, EarlyExit> {
    let mut size = size;
    let mut size_type = size_type;

    // 1. ShortOnly orders are expressed against the short-growth sign
    // convention used by the rest of the pipeline (negative = short).
    if matches!(direction, Direction::ShortOnly) {
        size = -size;
    }

    // 2. TargetPercent -> TargetValue.
    if matches!(size_type, SizeType::TargetPercent) {
        if group_value.is_nan() {
            return Err(EarlyExit::Ignored(OrderStatusInfo::ValueNaN));
        }
        if group_value <= 0.0 {
            return Err(EarlyExit::Rejected(OrderStatusInfo::ValueZeroNeg));
        }
        size *= group_value;
        size_type = SizeType::TargetValue;
    }

    // 3. Value/TargetValue -> Amount/TargetAmount.
    if matches!(size_type, SizeType::Value | SizeType::TargetValue) {
        if val_price.is_nan() {
            return Err(EarlyExit::Ignored(OrderStatusInfo::ValPriceNaN));
        }
        size /= val_price;
        size_type = if matches!(size_type, SizeType::Value) {
            SizeType::Amount
        } else {
            SizeType::TargetAmount
        };
    }

    // 4. TargetAmount -> Amount.
    if matches!(size_type, SizeType::TargetAmount) {
        size -= position;
        size_type = SizeType::Amount;
    }

    let mut percent = None;

    // 5. An infinite Amount under ShortOnly/Both means "100% of capacity";
    // recast it as a Percent of magnitude 1 so step 6 folds it uniformly.
    if matches!(size_type, SizeType::Amount)
        && size.is_infinite()
        && matches!(direction, Direction::ShortOnly | Direction::Both)
    {
        size = if size.is_sign_positive() { 1.0 } else { -1.0 };
        size_type = SizeType::Percent;
    }

    // 6. Percent -> Amount (carrying `percent` alongside a signed-infinite
    // placeholder size so the buy/sell branch knows which side it targets).
    if matches!(size_type, SizeType::Percent) {
        let p = size.abs();
        size = if size >= 0.0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
        percent = Some(p);
    }

    // 7. Anything still NaN at this point is a no-op.
    if size.is_nan() {
        return Err(EarlyExit::Ignored(OrderStatusInfo::SizeNaN));
    }

    Ok(NormalizedSize { size, percent })
}
