//! Driver-facing configuration surface and per-run mutable state (§3.4).

use serde::{Deserialize, Serialize};

use crate::domain::enums::CallSeqType;
use crate::error::ConfigError;
use crate::flex::FlexArray;

/// The single validated entry point every driver takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub target_shape: (usize, usize),
    pub group_lens: Vec<usize>,
    pub cash_sharing: bool,
    pub init_cash: FlexArray,
    pub init_position: FlexArray,
    pub call_seq_type: CallSeqType,
    pub call_seq: Option<Vec<Vec<i64>>>,
    pub segment_mask: FlexArray,
    pub ffill_val_price: bool,
    pub update_value: bool,
    pub fill_pos_record: bool,
    pub flex_2d: bool,
    pub max_orders: Option<usize>,
    pub max_logs: Option<usize>,
    pub master_seed: u64,
}

impl SimConfig {
    /// Column count.
    pub fn cols(&self) -> usize {
        self.target_shape.1
    }

    /// Bar count.
    pub fn bars(&self) -> usize {
        self.target_shape.0
    }

    /// Group count.
    pub fn n_groups(&self) -> usize {
        self.group_lens.len()
    }

    /// Column offset where group `g` starts.
    pub fn group_start(&self, g: usize) -> usize {
        self.group_lens[..g].iter().sum()
    }

    /// Which group owns column `col`.
    pub fn group_of(&self, col: usize) -> usize {
        let mut start = 0;
        for (g, &len) in self.group_lens.iter().enumerate() {
            if col < start + len {
                return g;
            }
            start += len;
        }
        self.group_lens.len().saturating_sub(1)
    }

    /// Index of the wallet (pooled cash account) that owns column `col`:
    /// the group when `cash_sharing`, the column itself otherwise — this
    /// makes "one wallet per group" and "one wallet per column" the same
    /// code path with `group_lens = vec![1; cols]`.
    pub fn wallet_of(&self, col: usize) -> usize {
        if self.cash_sharing {
            self.group_of(col)
        } else {
            col
        }
    }

    pub fn n_wallets(&self) -> usize {
        if self.cash_sharing {
            self.n_groups()
        } else {
            self.cols()
        }
    }

    /// `max_orders`/`max_logs`, defaulted to the bar count per §3.3.
    pub fn max_orders(&self) -> usize {
        self.max_orders.unwrap_or_else(|| self.bars())
    }

    pub fn max_logs(&self) -> usize {
        self.max_logs.unwrap_or_else(|| self.bars())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (bars, cols) = self.target_shape;

        let group_sum: usize = self.group_lens.iter().sum();
        if group_sum != cols {
            return Err(ConfigError::GroupLenMismatch { sum: group_sum, cols });
        }

        self.init_cash.validate_shape("init_cash", bars, cols)?;
        self.init_position.validate_shape("init_position", bars, cols)?;
        self.segment_mask.validate_shape("segment_mask", bars, cols)?;

        if let Some(call_seq) = &self.call_seq {
            if call_seq.len() != bars {
                return Err(ConfigError::ShapeMismatch {
                    expected: (bars, cols),
                    got: (call_seq.len(), call_seq.first().map_or(0, Vec::len)),
                });
            }
            for (row_idx, row) in call_seq.iter().enumerate() {
                if row.len() != cols {
                    return Err(ConfigError::ShapeMismatch {
                        expected: (bars, cols),
                        got: (call_seq.len(), row.len()),
                    });
                }
                for g in 0..self.n_groups() {
                    let start = self.group_start(g);
                    let len = self.group_lens[g];
                    validate_permutation(&row[start..start + len], row_idx)?;
                }
            }
        }

        if let Some(m) = self.max_orders {
            if m == 0 {
                return Err(ConfigError::InvalidCapacity);
            }
        }
        if let Some(m) = self.max_logs {
            if m == 0 {
                return Err(ConfigError::InvalidCapacity);
            }
        }

        Ok(())
    }
}

fn validate_permutation(slice: &[i64], row: usize) -> Result<(), ConfigError> {
    let len = slice.len();
    let mut seen = vec![false; len];
    for &v in slice {
        if v < 0 || v as usize >= len || seen[v as usize] {
            return Err(ConfigError::InvalidCallSeqPermutation { row, len });
        }
        seen[v as usize] = true;
    }
    Ok(())
}

/// A column's market-side state: position, valuation price, and its own
/// short debt (debt is a per-column obligation even when cash is pooled in
/// a shared [`Wallet`] — only the cash balance itself is shared).
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnMarket {
    pub position: f64,
    pub val_price: f64,
    pub debt: f64,
}

impl ColumnMarket {
    pub fn new(position: f64, val_price: f64) -> Self {
        Self {
            position,
            val_price,
            debt: 0.0,
        }
    }

    pub fn asset_value(&self) -> f64 {
        self.position * self.val_price
    }
}

/// A cash account shared by every column in a group (or, with
/// `group_lens = vec![1; cols]`, a single column's own account).
#[derive(Debug, Clone, Copy)]
pub struct Wallet {
    pub cash: f64,
    pub prev_value: f64,
}

impl Wallet {
    pub fn new(init_cash: f64, init_asset_value: f64) -> Self {
        Self {
            cash: init_cash,
            prev_value: init_cash + init_asset_value,
        }
    }
}
