//! Requantization: accumulator -> int8 at the requested output exponent
//!
//! A product of values at `2^input_q` and `2^weight_q` sits at
//! `2^(input_q + weight_q)`. Expressing it at `2^output_q` takes an arithmetic
//! shift by `input_q + weight_q - output_q` bits, followed by saturation.
//! Both kernels go through [`Requant`]; nothing else shifts accumulators.

use tracing::debug;

use crate::error::{FixedPointError, Result};
use crate::{INT8_MAX, INT8_MIN};

/// What to do when the computed shift is negative (a left shift)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeShift {
    /// Multiply the accumulator by `2^(-shift)` (saturating) before clamping
    #[default]
    LeftShift,
    /// Refuse to build the rule
    Reject,
}

/// Shift-and-saturate rule shared by the layer kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requant {
    shift: i64,
}

impl Requant {
    /// Derive the rule from the three exponents
    pub fn from_exponents(
        input_q: i32,
        weight_q: i32,
        output_q: i32,
        policy: NegativeShift,
    ) -> Result<Self> {
        let shift = input_q as i64 + weight_q as i64 - output_q as i64;
        if shift < 0 {
            match policy {
                NegativeShift::Reject => {
                    return Err(FixedPointError::InvalidShiftDirection { shift });
                }
                NegativeShift::LeftShift => {
                    debug!(shift, "negative requantization shift, scaling accumulator up");
                }
            }
        }
        Ok(Self { shift })
    }

    /// Rule with an explicit shift amount
    pub fn with_shift(shift: i64) -> Self {
        Self { shift }
    }

    /// Number of bits removed from the accumulator (negative means added)
    pub fn shift(&self) -> i64 {
        self.shift
    }

    /// Shift an accumulator and saturate it to `[-127, 127]`
    #[inline]
    pub fn apply(&self, acc: i64) -> i32 {
        requantize(acc, self.shift)
    }
}

/// Shift `acc` by `shift` bits and saturate.
///
/// Right shifts are arithmetic and therefore floor (`-5 >> 1 == -3`).
/// Left shifts saturate at the `i64` limits before clamping.
#[inline]
pub fn requantize(acc: i64, shift: i64) -> i32 {
    let shifted = if shift >= 0 {
        acc >> shift.min(63)
    } else {
        shift_left_saturating(acc, shift.unsigned_abs())
    };
    saturate(shifted)
}

/// Clamp to the symmetric int8 range
#[inline]
pub fn saturate(value: i64) -> i32 {
    value.clamp(INT8_MIN as i64, INT8_MAX as i64) as i32
}

fn shift_left_saturating(acc: i64, bits: u64) -> i64 {
    if acc == 0 {
        return 0;
    }
    let limit = if acc < 0 { i64::MIN } else { i64::MAX };
    if bits >= 63 {
        return limit;
    }
    acc.checked_mul(1i64 << bits).unwrap_or(limit)
}
