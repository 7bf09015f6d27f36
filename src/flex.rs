//! Broadcast-aware lookup into 0-, 1- or 2-dimensional parameter arrays.
//!
//! A [`FlexArray`] is the allocation-free stand-in for a materialised
//! `bars x cols` tensor: most parameters in a run are constant or vary along
//! a single axis, and `get` reduces that broadcast at call time instead of
//! forcing callers to pre-expand every array to full shape.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlexArray {
    /// Rank 0: the same value everywhere.
    Scalar(f64),
    /// Rank 1: interpreted per-column when `flex_2d` is false (a `1 x C` row
    /// vector), per-row when `flex_2d` is true (an `R x 1` column vector).
    OneD(Vec<f64>),
    /// Rank 2, row-major `rows x cols`: no broadcasting, direct lookup.
    Full {
        data: Vec<f64>,
        rows: usize,
        cols: usize,
    },
}

impl FlexArray {
    pub fn scalar(value: f64) -> Self {
        FlexArray::Scalar(value)
    }

    pub fn one_d(values: Vec<f64>) -> Self {
        FlexArray::OneD(values)
    }

    pub fn full(data: Vec<f64>, rows: usize, cols: usize) -> Self {
        FlexArray::Full { data, rows, cols }
    }

    /// Broadcast-aware lookup at bar `i`, column `col`.
    pub fn get(&self, i: usize, col: usize, flex_2d: bool) -> f64 {
        match self {
            FlexArray::Scalar(v) => *v,
            FlexArray::OneD(v) => {
                if v.is_empty() {
                    return f64::NAN;
                }
                if flex_2d {
                    v[i % v.len()]
                } else {
                    v[col % v.len()]
                }
            }
            FlexArray::Full { data, rows, cols } => {
                if *rows == 0 || *cols == 0 {
                    return f64::NAN;
                }
                let r = i % rows;
                let c = col % cols;
                data[r * cols + c]
            }
        }
    }

    /// Validates that this array's shape is compatible with `(rows, cols)`,
    /// i.e. that every axis it does specify either matches or divides the
    /// target evenly (broadcast, not truncation).
    pub fn validate_shape(&self, field: &'static str, rows: usize, cols: usize) -> Result<(), ConfigError> {
        match self {
            FlexArray::Scalar(_) => Ok(()),
            FlexArray::OneD(v) => {
                if v.is_empty() {
                    return Err(ConfigError::IncompatibleFlexShape {
                        len: 0,
                        shape: (rows, cols),
                    });
                }
                let _ = field;
                Ok(())
            }
            FlexArray::Full { data, rows: r, cols: c } => {
                if *r == rows && *c == cols && data.len() == rows * cols {
                    Ok(())
                } else {
                    Err(ConfigError::IncompatibleFlexShape {
                        len: data.len(),
                        shape: (rows, cols),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_broadcasts_everywhere() {
        let f = FlexArray::scalar(1.5);
        assert_eq!(f.get(0, 0, false), 1.5);
        assert_eq!(f.get(99, 7, true), 1.5);
    }

    #[test]
    fn one_d_per_column_when_not_flex_2d() {
        let f = FlexArray::one_d(vec![10.0, 20.0, 30.0]);
        assert_eq!(f.get(0, 0, false), 10.0);
        assert_eq!(f.get(5, 1, false), 20.0);
        assert_eq!(f.get(5, 2, false), 30.0);
    }

    #[test]
    fn one_d_per_row_when_flex_2d() {
        let f = FlexArray::one_d(vec![10.0, 20.0, 30.0]);
        assert_eq!(f.get(0, 99, true), 10.0);
        assert_eq!(f.get(1, 99, true), 20.0);
        assert_eq!(f.get(2, 0, true), 30.0);
    }

    #[test]
    fn full_indexes_both_axes() {
        let f = FlexArray::full(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        assert_eq!(f.get(0, 0, false), 1.0);
        assert_eq!(f.get(0, 2, false), 3.0);
        assert_eq!(f.get(1, 0, false), 4.0);
        assert_eq!(f.get(1, 2, false), 6.0);
    }

    #[test]
    fn full_shape_validates_exactly() {
        let f = FlexArray::full(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        assert!(f.validate_shape("x", 2, 2).is_ok());
        assert!(f.validate_shape("x", 3, 3).is_err());
    }

    #[test]
    fn empty_one_d_is_rejected() {
        let f = FlexArray::one_d(vec![]);
        assert!(f.validate_shape("x", 10, 1).is_err());
    }
}
