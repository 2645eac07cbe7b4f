//! Float <-> int8 conversion at the datapath boundary
//!
//! Two different rounding rules live here and they are not interchangeable:
//!
//! - [`quantize`] models the hardware quantizer: multiply by the scale,
//!   clamp to `[-127, 127]`, then **floor**.
//! - [`latch_i8`] / [`latch_i32`] model the input latch in front of the MAC
//!   array: **round to nearest, ties to even**.

use tracing::debug;

use crate::error::{FixedPointError, Result};
use crate::{INT8_MAX, INT8_MIN};

/// Scale factor `2^q` for an exponent
pub fn scale_for_exponent(q: i32) -> f64 {
    2f64.powi(q)
}

/// Quantize real values to int8.
///
/// When `scale` is `None` it is derived as `127 / max(|x|)`; an all-zero input
/// falls back to a scale of `1.0`. Returns the quantized values and the scale
/// actually used.
pub fn quantize(values: &[f64], scale: Option<f64>) -> Result<(Vec<i8>, f64)> {
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(FixedPointError::NotFinite { index });
    }

    let scale = match scale {
        Some(s) => s,
        None => {
            let max_abs = values.iter().fold(0.0f64, |m, &v| m.max(v.abs()));
            if max_abs == 0.0 {
                debug!("all-zero input, using unit quantization scale");
                1.0
            } else {
                INT8_MAX as f64 / max_abs
            }
        }
    };

    let mut quantized = Vec::with_capacity(values.len());
    for (index, &v) in values.iter().enumerate() {
        let scaled = v * scale;
        if scaled.is_nan() {
            return Err(FixedPointError::NotFinite { index });
        }
        let clamped = scaled.clamp(INT8_MIN as f64, INT8_MAX as f64);
        quantized.push(clamped.floor() as i8);
    }

    Ok((quantized, scale))
}

/// Convert int8 values back to reals: `value / scale`
pub fn dequantize(values: &[i8], scale: f64) -> Vec<f32> {
    let scale = scale as f32;
    values.iter().map(|&v| v as f32 / scale).collect()
}

/// Round a value onto the int8 lattice the way the input latch does.
///
/// Fails if the rounded value is not finite or falls outside `[-127, 127]`.
pub fn latch_i8(value: f64, index: usize) -> Result<i8> {
    if !value.is_finite() {
        return Err(FixedPointError::NotFinite { index });
    }
    let rounded = value.round_ties_even();
    if rounded < INT8_MIN as f64 || rounded > INT8_MAX as f64 {
        return Err(FixedPointError::OutOfRange {
            index,
            value: rounded as i64,
        });
    }
    Ok(rounded as i8)
}

/// Round a bias term to the nearest accumulator integer (ties to even)
pub fn latch_i32(value: f64, index: usize) -> Result<i32> {
    if !value.is_finite() {
        return Err(FixedPointError::NotFinite { index });
    }
    let rounded = value.round_ties_even();
    if rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
        return Err(FixedPointError::OutOfRange {
            index,
            value: rounded as i64,
        });
    }
    Ok(rounded as i32)
}
