//! Property-based tests for the fixed-point model.
//!
//! Key invariants:
//! - A non-negative shift followed by clamping equals floor division by 2^s
//!   followed by clamping, including for negative accumulators
//! - Requantized values never leave [-127, 127]
//! - Quantize/dequantize recovers a value to within one quantization step
//! - Latched values are the nearest lattice point

use fixsim_fixed_point::{
    dequantize, latch_i8, quantize, requantize, FixedPointValue, Requant, Shape,
};
use proptest::prelude::*;

fn floor_div_pow2(a: i64, s: u32) -> i64 {
    let d = 1i64 << s;
    a.div_euclid(d)
}

proptest! {
    #[test]
    fn shift_matches_floor_division(a in -(1i64 << 40)..(1i64 << 40), s in 0u32..40) {
        let expected = floor_div_pow2(a, s).clamp(-127, 127) as i32;
        prop_assert_eq!(requantize(a, s as i64), expected);
    }

    #[test]
    fn requantized_values_stay_in_range(a in any::<i64>(), s in -80i64..80) {
        let v = requantize(a, s);
        prop_assert!((-127..=127).contains(&v));
    }

    #[test]
    fn exponent_rule_matches_explicit_shift(
        input_q in -8i32..16,
        weight_q in -8i32..16,
        output_q in -8i32..16,
        a in -(1i64 << 30)..(1i64 << 30),
    ) {
        let rq = Requant::from_exponents(input_q, weight_q, output_q, Default::default()).unwrap();
        let shift = (input_q + weight_q - output_q) as i64;
        prop_assert_eq!(rq.shift(), shift);
        prop_assert_eq!(rq.apply(a), requantize(a, shift));
    }

    #[test]
    fn quantize_roundtrip_within_one_step(
        values in prop::collection::vec(-1.0f64..1.0, 1..64),
        scale in 1.0f64..100.0,
    ) {
        let (q, used) = quantize(&values, Some(scale)).unwrap();
        prop_assert_eq!(used, scale);
        let back = dequantize(&q, scale);
        let step = 1.0 / scale;
        for (&x, &y) in values.iter().zip(&back) {
            // Only away from the saturation boundary.
            if (x * scale).abs() < 127.0 {
                let err = x - y as f64;
                // floor: reconstructed value never exceeds the input
                prop_assert!(err >= -1e-5, "x={} y={}", x, y);
                prop_assert!(err < step + 1e-5, "x={} y={} step={}", x, y, step);
            }
        }
    }

    #[test]
    fn auto_scale_hits_full_range(values in prop::collection::vec(-50.0f64..50.0, 1..64)) {
        prop_assume!(values.iter().any(|v| v.abs() > 1e-3));
        let (q, _) = quantize(&values, None).unwrap();
        prop_assert!(q.iter().all(|&v| (-127..=127).contains(&v)));
        let max_abs = q.iter().map(|&v| (v as i32).abs()).max().unwrap();
        // The element with the largest magnitude lands on (or just below) the edge.
        prop_assert!(max_abs >= 126);
    }

    #[test]
    fn latch_picks_nearest_integer(x in -127.4f64..127.4) {
        let v = latch_i8(x, 0).unwrap() as f64;
        prop_assert!((v - x).abs() <= 0.5);
    }

    #[test]
    fn value_quantize_matches_quantizer(
        values in prop::collection::vec(-4.0f64..4.0, 1..32),
        q in 0i32..5,
    ) {
        let n = values.len();
        let v = FixedPointValue::quantize(&values, Shape::matrix(1, n), q).unwrap();
        let (raw, _) = quantize(&values, Some(2f64.powi(q))).unwrap();
        let expected: Vec<i32> = raw.iter().map(|&x| x as i32).collect();
        prop_assert_eq!(v.data(), &expected[..]);
    }
}

#[test]
fn arithmetic_shift_example() {
    // floor(-2.5) = -3, not -2
    assert_eq!(requantize(-5, 1), -3);
}
