//! Tensor shapes

use std::fmt;

use crate::error::{FixedPointError, Result};

/// Dimension sizes of a row-major tensor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a shape from its dimensions (outermost first)
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// `[batch, channels, height, width]`
    pub fn nchw(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self::new(vec![batch, channels, height, width])
    }

    /// `[batch, features]`
    pub fn matrix(batch: usize, features: usize) -> Self {
        Self::new(vec![batch, features])
    }

    /// Dimension sizes
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Size of the leading (batch) dimension
    pub fn batch(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }

    /// Number of elements per batch entry
    pub fn per_batch(&self) -> usize {
        self.dims.iter().skip(1).product()
    }

    /// Unpack a 4-D shape as `(batch, channels, height, width)`
    pub fn as_nchw(&self) -> Result<(usize, usize, usize, usize)> {
        match self.dims[..] {
            [n, c, h, w] => Ok((n, c, h, w)),
            _ => Err(FixedPointError::InvalidShape(format!(
                "expected [batch, channels, height, width], got {self}"
            ))),
        }
    }

    /// Convert a flat row-major offset into a multi-dimensional index
    pub fn unravel(&self, mut offset: usize) -> Vec<usize> {
        let mut index = vec![0; self.dims.len()];
        for (slot, &dim) in index.iter_mut().zip(&self.dims).rev() {
            if dim == 0 {
                continue;
            }
            *slot = offset % dim;
            offset /= dim;
        }
        index
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel_and_batch() {
        let shape = Shape::nchw(2, 3, 4, 5);
        assert_eq!(shape.numel(), 120);
        assert_eq!(shape.batch(), 2);
        assert_eq!(shape.per_batch(), 60);
        assert_eq!(shape.as_nchw().unwrap(), (2, 3, 4, 5));
    }

    #[test]
    fn test_as_nchw_rejects_matrix() {
        let shape = Shape::matrix(1, 10);
        assert!(matches!(
            shape.as_nchw(),
            Err(FixedPointError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_unravel() {
        let shape = Shape::nchw(1, 2, 3, 4);
        // 1*12 + 2*4 + 3 = 23
        assert_eq!(shape.unravel(23), vec![0, 1, 2, 3]);
        assert_eq!(shape.unravel(0), vec![0, 0, 0, 0]);
    }
}
