//! Integer fully-connected layer

use fixsim_fixed_point::{FixedPointValue, NegativeShift, Requant, Shape};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{KernelError, Result};
use crate::params::FcParams;

/// Dense layer: `[batch, ...]` -> `[batch, out_features]` at `output_q`.
///
/// Every non-batch dimension is flattened in row-major order (channel-major
/// for `[n, c, h, w]` inputs), which is the order dense weights are exported
/// in.
pub fn linear(
    input: &FixedPointValue,
    params: &FcParams,
    output_q: i32,
    policy: NegativeShift,
) -> Result<FixedPointValue> {
    if input.shape().rank() < 2 {
        return Err(KernelError::ShapeMismatch {
            what: "fc input rank",
            expected: 2,
            got: input.shape().rank(),
        });
    }
    let batch = input.shape().batch();
    let features = input.shape().per_batch();
    if features != params.in_features() {
        return Err(KernelError::ShapeMismatch {
            what: "fc input features",
            expected: params.in_features(),
            got: features,
        });
    }
    let requant = Requant::from_exponents(input.q(), params.weight_q(), output_q, policy)?;

    debug!(
        batch,
        in_features = features,
        out_features = params.out_features(),
        shift = requant.shift(),
        "linear"
    );

    let out_features = params.out_features();
    let mut output = vec![0i32; batch * out_features];
    output
        .par_chunks_mut(out_features)
        .zip(input.data().par_chunks(features))
        .for_each(|(out, x)| {
            for (o, slot) in out.iter_mut().enumerate() {
                let acc: i64 = x
                    .iter()
                    .zip(params.row(o))
                    .map(|(&xi, &wi)| xi as i64 * wi as i64)
                    .sum();
                *slot = requant.apply(acc + params.bias()[o] as i64);
            }
        });

    Ok(FixedPointValue::new(output, Shape::matrix(batch, out_features), output_q)?)
}
