//! Model I/O error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Size mismatch in {path}: expected {expected} values, got {got}")]
    ShapeMismatch {
        path: String,
        expected: usize,
        got: usize,
    },

    #[error("Parse error in {path} line {line}: invalid number {token:?}")]
    Parse {
        path: String,
        line: usize,
        token: String,
    },

    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Exponent mismatch for layer {layer}: expected input q={expected}, got q={got}")]
    ExponentMismatch { layer: String, expected: i32, got: i32 },

    #[error("Network config error: {0}")]
    Config(String),

    #[error("Fixed-point error: {0}")]
    FixedPoint(#[from] fixsim_fixed_point::FixedPointError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] fixsim_kernels::KernelError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
