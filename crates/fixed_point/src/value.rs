//! Immutable fixed-point tensor

use crate::error::{FixedPointError, Result};
use crate::quantize::{latch_i8, quantize, scale_for_exponent};
use crate::shape::Shape;
use crate::{INT8_MAX, INT8_MIN};

/// A shaped tensor of int8-range integers at scale `2^q`.
///
/// Elements are stored in `i32` but always lie in `[-127, 127]`; every
/// constructor checks this. There are no mutating accessors: a new value is
/// built for every transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPointValue {
    data: Vec<i32>,
    shape: Shape,
    q: i32,
}

impl FixedPointValue {
    /// Create from raw integers, validating length and range
    pub fn new(data: Vec<i32>, shape: Shape, q: i32) -> Result<Self> {
        if data.len() != shape.numel() {
            return Err(FixedPointError::ShapeMismatch {
                expected: shape.numel(),
                got: data.len(),
            });
        }
        if let Some((index, &value)) = data
            .iter()
            .enumerate()
            .find(|(_, &v)| !(INT8_MIN..=INT8_MAX).contains(&v))
        {
            return Err(FixedPointError::OutOfRange {
                index,
                value: value as i64,
            });
        }
        Ok(Self { data, shape, q })
    }

    /// Create from int8 storage (e.g. a raw binary file)
    pub fn from_i8(data: &[i8], shape: Shape, q: i32) -> Result<Self> {
        Self::new(data.iter().map(|&v| v as i32).collect(), shape, q)
    }

    /// Latch float data that already sits on the integer lattice.
    ///
    /// Each element is rounded to nearest (ties to even) and range checked.
    pub fn latch(values: &[f64], shape: Shape, q: i32) -> Result<Self> {
        let data = values
            .iter()
            .enumerate()
            .map(|(i, &v)| latch_i8(v, i).map(|x| x as i32))
            .collect::<Result<Vec<_>>>()?;
        Self::new(data, shape, q)
    }

    /// Quantize real values at scale `2^q` (floor, saturating)
    pub fn quantize(real: &[f64], shape: Shape, q: i32) -> Result<Self> {
        let (data, _) = quantize(real, Some(scale_for_exponent(q)))?;
        Self::from_i8(&data, shape, q)
    }

    /// All-zero value
    pub fn zeros(shape: Shape, q: i32) -> Self {
        Self {
            data: vec![0; shape.numel()],
            shape,
            q,
        }
    }

    /// Raw integers, row-major
    pub fn data(&self) -> &[i32] {
        &self.data
    }

    /// Consume and return the raw integers
    pub fn into_data(self) -> Vec<i32> {
        self.data
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Exponent `q`
    pub fn q(&self) -> i32 {
        self.q
    }

    /// Scale factor `2^q`
    pub fn scale(&self) -> f64 {
        scale_for_exponent(self.q)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elements belonging to batch entry `index`
    pub fn batch(&self, index: usize) -> Option<&[i32]> {
        let per = self.shape.per_batch();
        let start = index.checked_mul(per)?;
        self.data.get(start..start + per)
    }

    /// Elements narrowed to `i8`
    pub fn to_i8(&self) -> Vec<i8> {
        self.data.iter().map(|&v| v as i8).collect()
    }

    /// Real-number equivalent, `data / 2^q`
    pub fn to_real(&self) -> Vec<f32> {
        let scale = self.scale();
        self.data.iter().map(|&v| (v as f64 / scale) as f32).collect()
    }

    /// Same data under a different shape with the same element count
    pub fn reshape(&self, shape: Shape) -> Result<Self> {
        if shape.numel() != self.data.len() {
            return Err(FixedPointError::ShapeMismatch {
                expected: self.data.len(),
                got: shape.numel(),
            });
        }
        Ok(Self {
            data: self.data.clone(),
            shape,
            q: self.q,
        })
    }

    /// Collapse all non-batch dimensions into one feature axis.
    ///
    /// Row-major order is kept, so a `[n, c, h, w]` tensor flattens
    /// channel-major and row-major within each channel.
    pub fn flatten_features(&self) -> Self {
        Self {
            data: self.data.clone(),
            shape: Shape::matrix(self.shape.batch(), self.shape.per_batch()),
            q: self.q,
        }
    }
}
