//! Simulation drivers (§4.6): shared per-bar spine plus four entry points
//! over it — from-orders, from-signals, generic callback, and flexible.

pub mod call_seq;
pub mod context;
pub mod engine;
pub mod flexible;
pub mod from_orders;
pub mod from_signals;
pub mod generic;

pub use context::SimConfig;
pub use engine::{OhlcData, SimulationOutput};
pub use from_orders::{simulate_from_orders, OrderSource};
pub use from_signals::{simulate_from_signals, SignalSource};
