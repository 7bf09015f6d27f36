//! Record aggregators (§4.8): reconstruct entry trades, exit trades, and
//! positions from the flat per-column order-record stream. Inputs are never
//! mutated; aggregators always produce new, compacted arrays.

pub mod entry_trades;
pub mod exit_trades;
pub mod positions;

pub use entry_trades::build_entry_trades;
pub use exit_trades::build_exit_trades;
pub use positions::build_positions;

use crate::domain::enums::TradeDirection;
use crate::domain::trade::TradeRecord;

const SIZE_EPS: f64 = 1e-9;

fn pnl(entry_price: f64, exit_price: f64, size: f64, direction: TradeDirection, entry_fees: f64, exit_fees: f64) -> f64 {
    TradeRecord::compute_pnl(entry_price, exit_price, size, direction, entry_fees, exit_fees)
}

/// Same as `TradeRecord::compute_return`, guarded against a zero notional
/// (an all-fee position, or a degenerate zero-price fill).
fn ret(pnl: f64, entry_price: f64, size: f64) -> f64 {
    let denom = entry_price * size;
    if denom == 0.0 {
        0.0
    } else {
        TradeRecord::compute_return(pnl, entry_price, size)
    }
}
