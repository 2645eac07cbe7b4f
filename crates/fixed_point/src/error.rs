//! Fixed-point error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixedPointError {
    #[error("Shape mismatch: expected {expected} elements, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Value {value} at index {index} is outside the int8 range [-127, 127]")]
    OutOfRange { index: usize, value: i64 },

    #[error("Non-finite value at index {index}")]
    NotFinite { index: usize },

    #[error("Negative requantization shift {shift} rejected by policy")]
    InvalidShiftDirection { shift: i64 },

    #[error("Invalid shape: {0}")]
    InvalidShape(String),
}

pub type Result<T> = std::result::Result<T, FixedPointError>;
