//! Weight and activation writers

use std::fmt::Write as _;
use std::path::Path;

use fixsim_fixed_point::{quantize, FixedPointError, FixedPointValue, Shape};
use tracing::info;

use crate::error::Result;

/// Write an activation as raw int8 `[channels, height, width]`.
///
/// 4-D values contribute their first batch entry only.
pub fn save_activation_binary<P: AsRef<Path>>(value: &FixedPointValue, path: P) -> Result<()> {
    let path = path.as_ref();
    let data = match value.shape().rank() {
        4 => value.batch(0).unwrap_or(&[]),
        3 => value.data(),
        rank => {
            return Err(FixedPointError::InvalidShape(format!(
                "expected a 3-D or 4-D activation, got {rank}-D"
            ))
            .into())
        }
    };
    let bytes: Vec<u8> = data.iter().map(|&v| v as i8 as u8).collect();
    std::fs::write(path, &bytes)?;
    info!(path = %path.display(), shape = %value.shape(), "saved activation");
    Ok(())
}

/// Quantize real activation data and write it as raw int8.
///
/// Returns the scale used (derived from the data when `scale` is `None`).
pub fn save_real_activation_binary<P: AsRef<Path>>(
    real: &[f64],
    shape: &Shape,
    path: P,
    scale: Option<f64>,
) -> Result<f64> {
    let path = path.as_ref();
    let per_entry = match shape.rank() {
        4 => shape.per_batch(),
        3 => shape.numel(),
        rank => {
            return Err(FixedPointError::InvalidShape(format!(
                "expected a 3-D or 4-D activation, got {rank}-D"
            ))
            .into())
        }
    };
    if real.len() != shape.numel() {
        return Err(FixedPointError::ShapeMismatch {
            expected: shape.numel(),
            got: real.len(),
        }
        .into());
    }
    let (quantized, used) = quantize(&real[..per_entry], scale)?;
    save_weights_binary(&quantized, path)?;
    info!(path = %path.display(), shape = %shape, scale = used, "saved quantized activation");
    Ok(used)
}

/// Write int8 values as raw bytes
pub fn save_weights_binary<P: AsRef<Path>>(weights: &[i8], path: P) -> Result<()> {
    let bytes: Vec<u8> = weights.iter().map(|&w| w as u8).collect();
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Write int8 values as text, one per line
pub fn save_weights_text<P: AsRef<Path>>(weights: &[i8], path: P) -> Result<()> {
    let mut out = String::with_capacity(weights.len() * 5);
    for w in weights {
        let _ = writeln!(out, "{w}");
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Write real values as text, one per line
pub fn save_real_text<P: AsRef<Path>>(values: &[f32], path: P) -> Result<()> {
    let mut out = String::with_capacity(values.len() * 12);
    for v in values {
        let _ = writeln!(out, "{v}");
    }
    std::fs::write(path, out)?;
    Ok(())
}
