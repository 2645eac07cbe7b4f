//! Element-wise comparison of simulated and golden activations

use fixsim_fixed_point::FixedPointValue;
use serde::Serialize;

/// Relative tolerance of the real-valued check
pub const RTOL: f64 = 1e-5;

/// Absolute tolerance of the real-valued check
pub const ATOL: f64 = 1e-6;

/// How a simulated activation relates to its golden counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Identical integers at the same exponent
    Exact,
    /// Not identical, but every dequantized element is within tolerance
    WithinTolerance,
    Mismatch,
}

/// Location and values of the largest absolute difference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaxDiff {
    /// Multi-dimensional index in the actual tensor's shape
    pub index: Vec<usize>,
    pub actual: f32,
    pub expected: f32,
    pub diff: f32,
}

/// Summary statistics of one comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub actual_shape: Vec<usize>,
    pub expected_shape: Vec<usize>,
    /// `(min, max)` of the actual integers
    pub actual_range: Option<(i32, i32)>,
    /// `(min, max)` of the expected integers
    pub expected_range: Option<(i32, i32)>,
    /// Element counts agree, so element-wise statistics are meaningful
    pub comparable: bool,
    pub exact: bool,
    pub allclose: bool,
    /// Absent when the tensors are not comparable or empty
    pub max_diff: Option<MaxDiff>,
    pub mean_abs_diff: Option<f64>,
}

impl Comparison {
    pub fn outcome(&self) -> Outcome {
        if self.exact {
            Outcome::Exact
        } else if self.allclose {
            Outcome::WithinTolerance
        } else {
            Outcome::Mismatch
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome() != Outcome::Mismatch
    }
}

fn range(data: &[i32]) -> Option<(i32, i32)> {
    let min = data.iter().copied().min()?;
    let max = data.iter().copied().max()?;
    Some((min, max))
}

/// `|a - e| <= atol + rtol * |e|` for every element pair
pub fn allclose(actual: &[f32], expected: &[f32], rtol: f64, atol: f64) -> bool {
    actual.len() == expected.len()
        && actual.iter().zip(expected).all(|(&a, &e)| {
            let (a, e) = (a as f64, e as f64);
            (a - e).abs() <= atol + rtol * e.abs()
        })
}

/// Compare a simulated activation against its golden counterpart.
///
/// Element-wise statistics are computed on dequantized values, so tensors at
/// different exponents compare by the real numbers they encode. Shapes may
/// differ as long as the element counts agree; indices are reported in the
/// actual tensor's shape.
pub fn compare(actual: &FixedPointValue, expected: &FixedPointValue) -> Comparison {
    let comparable = actual.len() == expected.len();
    let mut comparison = Comparison {
        actual_shape: actual.shape().dims().to_vec(),
        expected_shape: expected.shape().dims().to_vec(),
        actual_range: range(actual.data()),
        expected_range: range(expected.data()),
        comparable,
        exact: false,
        allclose: false,
        max_diff: None,
        mean_abs_diff: None,
    };
    if !comparable {
        return comparison;
    }

    comparison.exact = actual.q() == expected.q() && actual.data() == expected.data();

    let a = actual.to_real();
    let e = expected.to_real();
    comparison.allclose = allclose(&a, &e, RTOL, ATOL);

    let mut worst: Option<(usize, f32)> = None;
    let mut total = 0.0f64;
    for (i, (&av, &ev)) in a.iter().zip(&e).enumerate() {
        let diff = (av - ev).abs();
        total += diff as f64;
        if worst.map_or(true, |(_, w)| diff > w) {
            worst = Some((i, diff));
        }
    }
    if let Some((offset, diff)) = worst {
        comparison.max_diff = Some(MaxDiff {
            index: actual.shape().unravel(offset),
            actual: a[offset],
            expected: e[offset],
            diff,
        });
        comparison.mean_abs_diff = Some(total / a.len() as f64);
    }
    comparison
}
