//! Stop-loss / trailing-stop / take-profit tracking (§4.4).

pub mod state_machine;

pub use state_machine::{resolve_entry_price, resolve_exit_price, StopState};
