//! Kernel error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("Shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(
        "Invalid geometry: input size {input} with padding {padding} is smaller than kernel size {kernel_size}"
    )]
    InvalidGeometry {
        input: usize,
        kernel_size: usize,
        padding: usize,
    },

    #[error("Invalid layer parameters: {0}")]
    InvalidParams(String),

    #[error("Fixed-point error: {0}")]
    FixedPoint(#[from] fixsim_fixed_point::FixedPointError),
}

pub type Result<T> = std::result::Result<T, KernelError>;
