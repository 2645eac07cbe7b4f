//! Weight and activation loading
//!
//! Binary files hold raw int8 values, row-major: conv weights as
//! `[out_ch, in_ch, kh, kw]`, dense weights as `[out_features, in_features]`,
//! activations as `[channels, height, width]`. Text files hold the same values
//! as whitespace-separated numbers. A file must contain exactly the declared
//! number of values; nothing is padded or truncated.

use std::path::Path;

use fixsim_fixed_point::{latch_i32, latch_i8, FixedPointValue, Shape};
use fixsim_kernels::{ConvGeometry, ConvParams, FcParams};
use tracing::{debug, info};

use crate::config::WeightFormat;
use crate::error::{ModelError, Result};

/// Read a raw int8 file holding exactly `expected` values
pub fn read_int8_file<P: AsRef<Path>>(path: P, expected: usize) -> Result<Vec<i8>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    if bytes.len() != expected {
        return Err(ModelError::ShapeMismatch {
            path: path.display().to_string(),
            expected,
            got: bytes.len(),
        });
    }
    Ok(bytes.into_iter().map(|b| b as i8).collect())
}

/// Read whitespace-separated numbers from a text file
pub fn read_text_values<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let mut values = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        for token in line.split_whitespace() {
            let value = token.parse::<f64>().map_err(|_| ModelError::Parse {
                path: path.display().to_string(),
                line: line_no + 1,
                token: token.to_string(),
            })?;
            values.push(value);
        }
    }
    Ok(values)
}

/// Load an activation file as a `[1, channels, height, width]` value at `q`
pub fn load_activation_binary<P: AsRef<Path>>(
    path: P,
    [channels, height, width]: [usize; 3],
    q: i32,
) -> Result<FixedPointValue> {
    let path = path.as_ref();
    let raw = read_int8_file(path, channels * height * width)?;
    let value = FixedPointValue::from_i8(&raw, Shape::nchw(1, channels, height, width), q)?;
    info!(path = %path.display(), shape = %value.shape(), q, "loaded activation");
    Ok(value)
}

/// Load `expected` int8 weights in the given format.
///
/// Text weights are latched (round to nearest) onto the int8 lattice.
pub fn load_weights<P: AsRef<Path>>(
    path: P,
    format: WeightFormat,
    expected: usize,
) -> Result<Vec<i8>> {
    let path = path.as_ref();
    match format {
        WeightFormat::Binary => read_int8_file(path, expected),
        WeightFormat::Text => {
            let values = read_text_values(path)?;
            if values.len() != expected {
                return Err(ModelError::ShapeMismatch {
                    path: path.display().to_string(),
                    expected,
                    got: values.len(),
                });
            }
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| latch_i8(v, i).map_err(ModelError::from))
                .collect()
        }
    }
}

/// Load a text bias file with `expected` entries, latched to accumulator integers
pub fn load_bias_text<P: AsRef<Path>>(path: P, expected: usize) -> Result<Vec<i32>> {
    let path = path.as_ref();
    let values = read_text_values(path)?;
    if values.len() != expected {
        return Err(ModelError::ShapeMismatch {
            path: path.display().to_string(),
            expected,
            got: values.len(),
        });
    }
    let bias = values
        .iter()
        .enumerate()
        .map(|(i, &v)| latch_i32(v, i))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    debug!(path = %path.display(), len = bias.len(), "loaded bias");
    Ok(bias)
}

/// Load convolution parameters; the bias is zero unless a bias file is given
pub fn load_conv_weights<P: AsRef<Path>>(
    path: P,
    format: WeightFormat,
    geometry: ConvGeometry,
    weight_q: i32,
    bias: Option<&Path>,
) -> Result<ConvParams> {
    let path = path.as_ref();
    let weights = load_weights(path, format, geometry.weight_len())?;
    let bias = match bias {
        Some(b) => load_bias_text(b, geometry.out_channels)?,
        None => vec![0; geometry.out_channels],
    };
    let params = ConvParams::new(geometry, weights, bias, weight_q)?;
    info!(
        path = %path.display(),
        out_ch = geometry.out_channels,
        in_ch = geometry.in_channels,
        k = geometry.kernel_size,
        weight_q,
        "loaded conv weights"
    );
    Ok(params)
}

/// Load dense parameters; the bias is zero unless a bias file is given
pub fn load_fc_weights<P: AsRef<Path>>(
    path: P,
    format: WeightFormat,
    in_features: usize,
    out_features: usize,
    weight_q: i32,
    bias: Option<&Path>,
) -> Result<FcParams> {
    let path = path.as_ref();
    let weights = load_weights(path, format, in_features * out_features)?;
    let bias = match bias {
        Some(b) => load_bias_text(b, out_features)?,
        None => vec![0; out_features],
    };
    let params = FcParams::new(in_features, out_features, weights, bias, weight_q)?;
    info!(
        path = %path.display(),
        in_features,
        out_features,
        weight_q,
        "loaded fc weights"
    );
    Ok(params)
}
