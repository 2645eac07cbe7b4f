//! fixsim Layer Kernels
//!
//! Integer-domain convolution and fully-connected layers. Inputs and weights
//! are int8-range integers, products accumulate in `i64`, the bias is added at
//! accumulator scale, and the result goes through the shared requantization
//! rule from `fixsim_fixed_point`.

mod conv;
mod error;
mod fc;
mod params;

pub use conv::{conv2d, conv_output_size};
pub use error::{KernelError, Result};
pub use fc::linear;
pub use params::{ConvGeometry, ConvParams, FcParams};
