//! Immutable layer parameter bundles
//!
//! Weights are validated and latched to int8 once, when the bundle is built.
//! Bundles carry no interior mutability and can be shared across threads.

use fixsim_fixed_point::{latch_i32, latch_i8, FixedPointError, FixedPointValue, NegativeShift};

use crate::conv::{conv2d, conv_output_size};
use crate::error::{KernelError, Result};
use crate::fc::linear;

/// Shape description of a square-kernel 2D convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvGeometry {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

impl ConvGeometry {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        let geometry = Self {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check that every dimension is usable
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(KernelError::InvalidParams(format!(
                "channel counts must be positive (in={}, out={})",
                self.in_channels, self.out_channels
            )));
        }
        if self.kernel_size == 0 {
            return Err(KernelError::InvalidParams("kernel_size must be positive".into()));
        }
        if self.stride == 0 {
            return Err(KernelError::InvalidParams("stride must be positive".into()));
        }
        Ok(())
    }

    /// Number of weights: `out_channels * in_channels * kernel_size^2`
    pub fn weight_len(&self) -> usize {
        self.out_channels * self.filter_len()
    }

    /// Number of weights in one output channel's filter
    pub fn filter_len(&self) -> usize {
        self.in_channels * self.kernel_size * self.kernel_size
    }

    /// Output `(height, width)` for an input of `(height, width)`
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let out_h = conv_output_size(height, self.kernel_size, self.stride, self.padding)
            .ok_or(KernelError::InvalidGeometry {
                input: height,
                kernel_size: self.kernel_size,
                padding: self.padding,
            })?;
        let out_w = conv_output_size(width, self.kernel_size, self.stride, self.padding)
            .ok_or(KernelError::InvalidGeometry {
                input: width,
                kernel_size: self.kernel_size,
                padding: self.padding,
            })?;
        Ok((out_h, out_w))
    }
}

/// Convolution weights `[out_ch, in_ch, k, k]`, bias `[out_ch]` and `weight_q`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvParams {
    geometry: ConvGeometry,
    weights: Vec<i8>,
    bias: Vec<i32>,
    weight_q: i32,
}

impl ConvParams {
    /// Build from int8 weights and accumulator-scale bias
    pub fn new(
        geometry: ConvGeometry,
        weights: Vec<i8>,
        bias: Vec<i32>,
        weight_q: i32,
    ) -> Result<Self> {
        geometry.validate()?;
        check_len("conv weights", geometry.weight_len(), weights.len())?;
        check_len("conv bias", geometry.out_channels, bias.len())?;
        check_weights(&weights)?;
        Ok(Self {
            geometry,
            weights,
            bias,
            weight_q,
        })
    }

    /// Build with an all-zero bias
    pub fn zero_bias(geometry: ConvGeometry, weights: Vec<i8>, weight_q: i32) -> Result<Self> {
        let bias = vec![0; geometry.out_channels];
        Self::new(geometry, weights, bias, weight_q)
    }

    /// Build from float data, latching every weight and bias term once
    pub fn from_real(
        geometry: ConvGeometry,
        weights: &[f64],
        bias: Option<&[f64]>,
        weight_q: i32,
    ) -> Result<Self> {
        geometry.validate()?;
        check_len("conv weights", geometry.weight_len(), weights.len())?;
        let weights = latch_weights(weights)?;
        let bias = latch_bias(bias, geometry.out_channels, "conv bias")?;
        Self::new(geometry, weights, bias, weight_q)
    }

    pub fn geometry(&self) -> &ConvGeometry {
        &self.geometry
    }

    /// Flat weights, `[out_ch, in_ch, k, k]` row-major
    pub fn weights(&self) -> &[i8] {
        &self.weights
    }

    /// Weights of one output channel, `[in_ch, k, k]`
    pub fn filter(&self, out_channel: usize) -> &[i8] {
        let len = self.geometry.filter_len();
        &self.weights[out_channel * len..(out_channel + 1) * len]
    }

    pub fn bias(&self) -> &[i32] {
        &self.bias
    }

    pub fn weight_q(&self) -> i32 {
        self.weight_q
    }

    /// Run the convolution with the default negative-shift policy
    pub fn forward(&self, input: &FixedPointValue, output_q: i32) -> Result<FixedPointValue> {
        conv2d(input, self, output_q, NegativeShift::default())
    }
}

/// Dense weights `[out_features, in_features]`, bias `[out_features]` and `weight_q`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FcParams {
    in_features: usize,
    out_features: usize,
    weights: Vec<i8>,
    bias: Vec<i32>,
    weight_q: i32,
}

impl FcParams {
    /// Build from int8 weights and accumulator-scale bias
    pub fn new(
        in_features: usize,
        out_features: usize,
        weights: Vec<i8>,
        bias: Vec<i32>,
        weight_q: i32,
    ) -> Result<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(KernelError::InvalidParams(format!(
                "feature counts must be positive (in={in_features}, out={out_features})"
            )));
        }
        check_len("fc weights", in_features * out_features, weights.len())?;
        check_len("fc bias", out_features, bias.len())?;
        check_weights(&weights)?;
        Ok(Self {
            in_features,
            out_features,
            weights,
            bias,
            weight_q,
        })
    }

    /// Build with an all-zero bias
    pub fn zero_bias(
        in_features: usize,
        out_features: usize,
        weights: Vec<i8>,
        weight_q: i32,
    ) -> Result<Self> {
        Self::new(in_features, out_features, weights, vec![0; out_features], weight_q)
    }

    /// Build from float data, latching every weight and bias term once
    pub fn from_real(
        in_features: usize,
        out_features: usize,
        weights: &[f64],
        bias: Option<&[f64]>,
        weight_q: i32,
    ) -> Result<Self> {
        check_len("fc weights", in_features * out_features, weights.len())?;
        let weights = latch_weights(weights)?;
        let bias = latch_bias(bias, out_features, "fc bias")?;
        Self::new(in_features, out_features, weights, bias, weight_q)
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Flat weights, `[out_features, in_features]` row-major
    pub fn weights(&self) -> &[i8] {
        &self.weights
    }

    /// Weights feeding one output feature
    pub fn row(&self, out_feature: usize) -> &[i8] {
        &self.weights[out_feature * self.in_features..(out_feature + 1) * self.in_features]
    }

    pub fn bias(&self) -> &[i32] {
        &self.bias
    }

    pub fn weight_q(&self) -> i32 {
        self.weight_q
    }

    /// Run the dense layer with the default negative-shift policy
    pub fn forward(&self, input: &FixedPointValue, output_q: i32) -> Result<FixedPointValue> {
        linear(input, self, output_q, NegativeShift::default())
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(KernelError::ShapeMismatch { what, expected, got });
    }
    Ok(())
}

fn check_weights(weights: &[i8]) -> Result<()> {
    if let Some(index) = weights.iter().position(|&w| w == i8::MIN) {
        return Err(FixedPointError::OutOfRange {
            index,
            value: i8::MIN as i64,
        }
        .into());
    }
    Ok(())
}

fn latch_weights(weights: &[f64]) -> Result<Vec<i8>> {
    weights
        .iter()
        .enumerate()
        .map(|(i, &w)| latch_i8(w, i).map_err(KernelError::from))
        .collect()
}

fn latch_bias(bias: Option<&[f64]>, len: usize, what: &'static str) -> Result<Vec<i32>> {
    match bias {
        None => Ok(vec![0; len]),
        Some(b) => {
            check_len(what, len, b.len())?;
            b.iter()
                .enumerate()
                .map(|(i, &x)| latch_i32(x, i).map_err(KernelError::from))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> ConvGeometry {
        ConvGeometry::new(2, 3, 3, 1, 1).unwrap()
    }

    #[test]
    fn test_geometry_rejects_zero_stride() {
        assert!(matches!(
            ConvGeometry::new(1, 1, 3, 0, 0),
            Err(KernelError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_conv_weight_count_checked() {
        let err = ConvParams::zero_bias(geometry(), vec![0; 53], 0).unwrap_err();
        assert_eq!(
            err,
            KernelError::ShapeMismatch {
                what: "conv weights",
                expected: 54,
                got: 53
            }
        );
    }

    #[test]
    fn test_conv_bias_count_checked() {
        let err = ConvParams::new(geometry(), vec![0; 54], vec![0; 2], 0).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { what: "conv bias", .. }));
    }

    #[test]
    fn test_conv_filter_slices() {
        let weights: Vec<i8> = (0..54).map(|i| (i % 100) as i8).collect();
        let params = ConvParams::zero_bias(geometry(), weights, 0).unwrap();
        assert_eq!(params.filter(1).len(), 18);
        assert_eq!(params.filter(1)[0], 18);
        assert_eq!(params.filter(2)[17], 53);
    }

    #[test]
    fn test_from_real_latches_once() {
        let weights = [0.5f64, 1.5, -2.5, 126.7];
        let params = FcParams::from_real(2, 2, &weights, Some(&[10.5, -0.6]), 0).unwrap();
        assert_eq!(params.weights(), &[0, 2, -2, 127]);
        assert_eq!(params.bias(), &[10, -1]);
    }

    #[test]
    fn test_from_real_bias_beyond_single_precision() {
        let params = FcParams::from_real(1, 1, &[1.0], Some(&[16_777_217.0]), 0).unwrap();
        assert_eq!(params.bias(), &[16_777_217]);
    }

    #[test]
    fn test_weights_reject_minus_128() {
        let err = FcParams::zero_bias(1, 2, vec![1, -128], 0).unwrap_err();
        assert!(matches!(
            err,
            KernelError::FixedPoint(FixedPointError::OutOfRange { index: 1, .. })
        ));
    }

    #[test]
    fn test_fc_row() {
        let params = FcParams::zero_bias(3, 2, vec![1, 2, 3, 4, 5, 6], 0).unwrap();
        assert_eq!(params.row(0), &[1, 2, 3]);
        assert_eq!(params.row(1), &[4, 5, 6]);
    }

    #[test]
    fn test_output_size_rejects_degenerate() {
        let g = ConvGeometry::new(1, 1, 5, 1, 0).unwrap();
        assert!(matches!(
            g.output_size(4, 8),
            Err(KernelError::InvalidGeometry { input: 4, .. })
        ));
        assert_eq!(g.output_size(5, 8).unwrap(), (1, 4));
    }

    #[test]
    fn test_params_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConvParams>();
        assert_send_sync::<FcParams>();
    }
}
