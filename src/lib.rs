//! Event-driven portfolio simulation core.
//!
//! `domain` holds the shared vocabulary (requests, state, records), `flex`
//! and `numeric` are the broadcast/tolerance primitives everything else is
//! built on, `execution` is the single-order state transition, `stops` and
//! `signals` sit above it for the signal-driven driver, `sim` wires the four
//! driver entry points around one shared per-bar spine, and `aggregate` /
//! `series` turn the flat fill stream the drivers produce into trades,
//! positions, and derived per-bar series.

pub mod aggregate;
pub mod domain;
pub mod error;
pub mod execution;
pub mod flex;
pub mod numeric;
pub mod rng;
pub mod series;
pub mod signals;
pub mod sim;
pub mod stops;

pub use error::SimError;
pub use sim::{simulate_from_orders, simulate_from_signals, OrderSource, SignalSource, SimConfig};

#[cfg(test)]
mod tests {
    // Smoke tests that the public re-exports actually name the types callers
    // are expected to reach for, so a renamed/removed export fails here
    // instead of silently at some downstream call site.
    use super::*;

    #[test]
    fn sim_config_is_reachable_from_the_crate_root() {
        fn assert_type<T>() {}
        assert_type::<SimConfig>();
    }

    #[test]
    fn sim_error_is_reachable_from_the_crate_root() {
        fn assert_type<T>() {}
        assert_type::<SimError>();
    }
}
