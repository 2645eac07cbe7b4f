//! Integer 2D convolution

use fixsim_fixed_point::{FixedPointValue, NegativeShift, Requant, Shape};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{KernelError, Result};
use crate::params::ConvParams;

/// Output extent along one spatial axis: `floor((n - k + 2p) / s) + 1`.
///
/// Returns `None` when the padded input is smaller than the kernel or the
/// stride is zero.
pub fn conv_output_size(
    input: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    let padded = input + 2 * padding;
    if padded < kernel_size {
        return None;
    }
    Some((padded - kernel_size) / stride + 1)
}

/// Convolve `[batch, in_ch, H, W]` into `[batch, out_ch, H', W']` at `output_q`.
///
/// The input is zero-padded by `padding` on every side. Each output element is
/// `requant(sum(x * w) + bias)` with the shift `input.q + weight_q - output_q`.
/// Output planes are computed in parallel; the result does not depend on
/// scheduling.
pub fn conv2d(
    input: &FixedPointValue,
    params: &ConvParams,
    output_q: i32,
    policy: NegativeShift,
) -> Result<FixedPointValue> {
    let (batch, in_ch, in_h, in_w) = input.shape().as_nchw()?;
    let g = *params.geometry();
    if in_ch != g.in_channels {
        return Err(KernelError::ShapeMismatch {
            what: "conv input channels",
            expected: g.in_channels,
            got: in_ch,
        });
    }
    let (out_h, out_w) = g.output_size(in_h, in_w)?;
    let requant = Requant::from_exponents(input.q(), params.weight_q(), output_q, policy)?;

    debug!(
        batch,
        in_ch,
        in_h,
        in_w,
        out_ch = g.out_channels,
        out_h,
        out_w,
        shift = requant.shift(),
        "conv2d"
    );

    let k = g.kernel_size;
    let pad = g.padding as isize;
    let image_len = in_ch * in_h * in_w;
    let plane_len = out_h * out_w;
    let x = input.data();

    let mut output = vec![0i32; batch * g.out_channels * plane_len];
    output
        .par_chunks_mut(plane_len)
        .enumerate()
        .for_each(|(plane, out)| {
            let b = plane / g.out_channels;
            let oc = plane % g.out_channels;
            let image = &x[b * image_len..(b + 1) * image_len];
            let filter = params.filter(oc);
            let bias = params.bias()[oc] as i64;

            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc: i64 = 0;
                    for ic in 0..in_ch {
                        let channel = &image[ic * in_h * in_w..(ic + 1) * in_h * in_w];
                        let taps = &filter[ic * k * k..(ic + 1) * k * k];
                        for ky in 0..k {
                            let iy = (oy * g.stride + ky) as isize - pad;
                            if iy < 0 || iy >= in_h as isize {
                                continue;
                            }
                            let row = &channel[iy as usize * in_w..(iy as usize + 1) * in_w];
                            for kx in 0..k {
                                let ix = (ox * g.stride + kx) as isize - pad;
                                if ix < 0 || ix >= in_w as isize {
                                    continue;
                                }
                                acc += row[ix as usize] as i64 * taps[ky * k + kx] as i64;
                            }
                        }
                    }
                    out[oy * out_w + ox] = requant.apply(acc + bias);
                }
            }
        });

    let shape = Shape::nchw(batch, g.out_channels, out_h, out_w);
    Ok(FixedPointValue::new(output, shape, output_q)?)
}
