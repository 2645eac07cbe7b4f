//! fixsim Fixed-Point Model
//!
//! Power-of-two scaled int8 values as computed by the accelerator datapath.
//! A value holds integers in `[-127, 127]` plus an exponent `q`; the real
//! number it stands for is `data / 2^q`.

mod error;
mod quantize;
mod requant;
mod shape;
mod value;

pub use error::{FixedPointError, Result};
pub use quantize::{dequantize, latch_i32, latch_i8, quantize, scale_for_exponent};
pub use requant::{requantize, saturate, NegativeShift, Requant};
pub use shape::Shape;
pub use value::FixedPointValue;

/// Largest magnitude representable by the datapath (symmetric int8).
pub const INT8_MAX: i32 = 127;

/// Smallest value representable by the datapath. `-128` is never produced.
pub const INT8_MIN: i32 = -127;
