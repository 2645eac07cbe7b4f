//! Kernel tests against a straightforward scalar model.
//!
//! The reference pads the input explicitly, accumulates in i64, adds the bias,
//! floor-divides by 2^shift and clamps. The kernels must agree with it
//! element for element.

use fixsim_fixed_point::{FixedPointValue, NegativeShift, Shape};
use fixsim_kernels::{conv2d, linear, ConvGeometry, ConvParams, FcParams, KernelError};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_i8(rng: &mut ChaCha8Rng, len: usize) -> Vec<i8> {
    (0..len).map(|_| rng.gen_range(-127i8..=127)).collect()
}

fn random_i32(rng: &mut ChaCha8Rng, len: usize, bound: i32) -> Vec<i32> {
    (0..len).map(|_| rng.gen_range(-bound..=bound)).collect()
}

fn floor_shift(acc: i64, shift: i64) -> i64 {
    if shift >= 0 {
        acc.div_euclid(1i64 << shift)
    } else {
        acc * (1i64 << -shift)
    }
}

#[allow(clippy::too_many_arguments)]
fn reference_conv(
    input: &[i32],
    (n, c, h, w): (usize, usize, usize, usize),
    weights: &[i8],
    bias: &[i32],
    out_ch: usize,
    k: usize,
    stride: usize,
    pad: usize,
    shift: i64,
) -> Vec<i32> {
    let (ph, pw) = (h + 2 * pad, w + 2 * pad);
    let mut padded = vec![0i32; n * c * ph * pw];
    for b in 0..n {
        for ch in 0..c {
            for y in 0..h {
                for x in 0..w {
                    padded[((b * c + ch) * ph + y + pad) * pw + x + pad] =
                        input[((b * c + ch) * h + y) * w + x];
                }
            }
        }
    }
    let oh = (ph - k) / stride + 1;
    let ow = (pw - k) / stride + 1;
    let mut out = Vec::with_capacity(n * out_ch * oh * ow);
    for b in 0..n {
        for oc in 0..out_ch {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut acc = 0i64;
                    for ic in 0..c {
                        for ky in 0..k {
                            for kx in 0..k {
                                let xv = padded
                                    [((b * c + ic) * ph + oy * stride + ky) * pw + ox * stride + kx];
                                let wv = weights[((oc * c + ic) * k + ky) * k + kx];
                                acc += xv as i64 * wv as i64;
                            }
                        }
                    }
                    acc += bias[oc] as i64;
                    out.push(floor_shift(acc, shift).clamp(-127, 127) as i32);
                }
            }
        }
    }
    out
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn all_ones_three_by_three() {
    let input = FixedPointValue::new(vec![1; 9], Shape::nchw(1, 1, 3, 3), 0).unwrap();
    let params = ConvParams::zero_bias(ConvGeometry::new(1, 1, 3, 1, 0).unwrap(), vec![1; 9], 0).unwrap();

    let out = params.forward(&input, 0).unwrap();
    assert_eq!(out.data(), &[9]);

    // shift = input_q + weight_q - output_q = 1
    let out = params.forward(&input, -1).unwrap();
    assert_eq!(out.data(), &[4]);
    assert_eq!(out.q(), -1);

    // output_q = 1 asks for a left shift: 9 << 1
    let out = params.forward(&input, 1).unwrap();
    assert_eq!(out.data(), &[18]);
    assert_eq!(out.q(), 1);
}

#[test]
fn reference_network_shapes() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    // conv1: 1 -> 32, k5 s1 p2, 32x32 -> 32x32
    let g = ConvGeometry::new(1, 32, 5, 1, 2).unwrap();
    let conv1 = ConvParams::zero_bias(g, random_i8(&mut rng, g.weight_len()), 9).unwrap();
    let x = FixedPointValue::from_i8(&random_i8(&mut rng, 32 * 32), Shape::nchw(1, 1, 32, 32), 0).unwrap();
    assert_eq!(conv1.forward(&x, 0).unwrap().shape().dims(), &[1, 32, 32, 32]);

    // conv3: 64 -> 64, k3 s2 p1, 16x16 -> 8x8
    let g = ConvGeometry::new(64, 64, 3, 2, 1).unwrap();
    let conv3 = ConvParams::zero_bias(g, random_i8(&mut rng, g.weight_len()), 8).unwrap();
    let x = FixedPointValue::from_i8(&random_i8(&mut rng, 64 * 16 * 16), Shape::nchw(1, 64, 16, 16), 0)
        .unwrap();
    assert_eq!(conv3.forward(&x, 0).unwrap().shape().dims(), &[1, 64, 8, 8]);

    // fc: 128 -> 10 on a [1, 128, 1, 1] activation
    let fc = FcParams::zero_bias(128, 10, random_i8(&mut rng, 1280), 6).unwrap();
    let x = FixedPointValue::from_i8(&random_i8(&mut rng, 128), Shape::nchw(1, 128, 1, 1), 0).unwrap();
    assert_eq!(fc.forward(&x, 0).unwrap().shape().dims(), &[1, 10]);
}

#[test]
fn repeated_calls_are_deterministic() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let g = ConvGeometry::new(8, 16, 3, 1, 1).unwrap();
    let params = ConvParams::new(
        g,
        random_i8(&mut rng, g.weight_len()),
        random_i32(&mut rng, 16, 1000),
        4,
    )
    .unwrap();
    let x = FixedPointValue::from_i8(&random_i8(&mut rng, 2 * 8 * 12 * 12), Shape::nchw(2, 8, 12, 12), 3)
        .unwrap();
    let first = params.forward(&x, 0).unwrap();
    for _ in 0..4 {
        assert_eq!(params.forward(&x, 0).unwrap(), first);
    }
}

#[test]
fn shared_params_across_threads() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let params = FcParams::zero_bias(16, 4, random_i8(&mut rng, 64), 2).unwrap();
    let x = FixedPointValue::from_i8(&random_i8(&mut rng, 16), Shape::matrix(1, 16), 0).unwrap();
    let expected = params.forward(&x, 0).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|_| s.spawn(|| params.forward(&x, 0).unwrap())).collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}

#[test]
fn errors_leave_no_output() {
    let params = FcParams::zero_bias(4, 2, vec![1; 8], 0).unwrap();
    let x = FixedPointValue::zeros(Shape::matrix(1, 3), 0);
    let result = linear(&x, &params, 0, NegativeShift::LeftShift);
    assert!(matches!(result, Err(KernelError::ShapeMismatch { .. })));
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn conv_matches_reference(
        seed in any::<u64>(),
        (batch, in_ch, out_ch) in (1usize..3, 1usize..4, 1usize..4),
        (k, stride, pad) in (1usize..4, 1usize..3, 0usize..3),
        (h, w) in (1usize..9, 1usize..9),
        (input_q, weight_q, output_q) in (0i32..4, 0i32..8, -2i32..4),
    ) {
        prop_assume!(h + 2 * pad >= k && w + 2 * pad >= k);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let g = ConvGeometry::new(in_ch, out_ch, k, stride, pad).unwrap();
        let weights = random_i8(&mut rng, g.weight_len());
        let bias = random_i32(&mut rng, out_ch, 5000);
        let data: Vec<i32> = random_i8(&mut rng, batch * in_ch * h * w).iter().map(|&v| v as i32).collect();

        let params = ConvParams::new(g, weights.clone(), bias.clone(), weight_q).unwrap();
        let input = FixedPointValue::new(data.clone(), Shape::nchw(batch, in_ch, h, w), input_q).unwrap();
        let out = conv2d(&input, &params, output_q, NegativeShift::LeftShift).unwrap();

        let shift = (input_q + weight_q - output_q) as i64;
        let expected = reference_conv(&data, (batch, in_ch, h, w), &weights, &bias, out_ch, k, stride, pad, shift);
        prop_assert_eq!(out.data(), &expected[..]);
        prop_assert_eq!(out.q(), output_q);
    }

    #[test]
    fn fc_matches_reference(
        seed in any::<u64>(),
        batch in 1usize..4,
        in_features in 1usize..40,
        out_features in 1usize..12,
        weight_q in 0i32..10,
        output_q in 0i32..3,
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weights = random_i8(&mut rng, in_features * out_features);
        let bias = random_i32(&mut rng, out_features, 3000);
        let data: Vec<i32> = random_i8(&mut rng, batch * in_features).iter().map(|&v| v as i32).collect();

        let params = FcParams::new(in_features, out_features, weights.clone(), bias.clone(), weight_q).unwrap();
        let input = FixedPointValue::new(data.clone(), Shape::matrix(batch, in_features), 0).unwrap();
        let out = params.forward(&input, output_q).unwrap();

        let shift = (weight_q - output_q) as i64;
        let mut expected = Vec::new();
        for b in 0..batch {
            for o in 0..out_features {
                let acc: i64 = (0..in_features)
                    .map(|i| data[b * in_features + i] as i64 * weights[o * in_features + i] as i64)
                    .sum::<i64>()
                    + bias[o] as i64;
                expected.push(floor_shift(acc, shift).clamp(-127, 127) as i32);
            }
        }
        prop_assert_eq!(out.data(), &expected[..]);
    }
}
