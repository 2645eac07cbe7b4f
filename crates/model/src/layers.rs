//! Loaded layers addressed by name

use std::path::Path;

use fixsim_fixed_point::{FixedPointValue, NegativeShift};
use fixsim_kernels::{conv2d, linear, ConvParams, FcParams};
use tracing::debug;

use crate::config::{LayerKind, LayerSpec, NetworkConfig};
use crate::error::{ModelError, Result};
use crate::loader::{load_conv_weights, load_fc_weights};

/// Parameters of one loaded layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerParams {
    Conv(ConvParams),
    Fc(FcParams),
}

/// A layer spec together with its loaded parameters
#[derive(Debug, Clone)]
pub struct Layer {
    spec: LayerSpec,
    params: LayerParams,
    policy: NegativeShift,
}

impl Layer {
    /// Pair a spec with parameters, checking that they describe the same layer
    pub fn new(spec: LayerSpec, params: LayerParams, policy: NegativeShift) -> Result<Self> {
        let matches = match (&spec.kind, &params) {
            (LayerKind::Conv { .. }, LayerParams::Conv(p)) => {
                spec.conv_geometry()?.as_ref() == Some(p.geometry())
                    && spec.weight_q == p.weight_q()
            }
            (
                LayerKind::Fc {
                    in_features,
                    out_features,
                },
                LayerParams::Fc(p),
            ) => {
                *in_features == p.in_features()
                    && *out_features == p.out_features()
                    && spec.weight_q == p.weight_q()
            }
            _ => false,
        };
        if !matches {
            return Err(ModelError::Config(format!(
                "parameters do not match the declaration of layer {}",
                spec.name
            )));
        }
        Ok(Self {
            spec,
            params,
            policy,
        })
    }

    /// Load a layer's weights (and optional bias) from `params_dir`
    pub fn load(spec: &LayerSpec, params_dir: &Path, policy: NegativeShift) -> Result<Self> {
        let weights = params_dir.join(&spec.weights);
        let bias = spec.bias.as_ref().map(|b| params_dir.join(b));
        let params = match spec.kind {
            LayerKind::Conv { .. } => {
                let geometry = spec.conv_geometry()?.ok_or_else(|| {
                    ModelError::Config(format!("layer {} is not a convolution", spec.name))
                })?;
                LayerParams::Conv(load_conv_weights(
                    &weights,
                    spec.weight_format,
                    geometry,
                    spec.weight_q,
                    bias.as_deref(),
                )?)
            }
            LayerKind::Fc {
                in_features,
                out_features,
            } => LayerParams::Fc(load_fc_weights(
                &weights,
                spec.weight_format,
                in_features,
                out_features,
                spec.weight_q,
                bias.as_deref(),
            )?),
        };
        Self::new(spec.clone(), params, policy)
    }

    /// Load only the named layer of `config`; other layers' files are not read
    pub fn load_named<P: AsRef<Path>>(
        config: &NetworkConfig,
        name: &str,
        params_dir: P,
    ) -> Result<Self> {
        config.validate()?;
        let spec = config
            .layer(name)
            .ok_or_else(|| ModelError::UnknownLayer(name.to_string()))?;
        Self::load(spec, params_dir.as_ref(), config.negative_shift.into())
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &LayerSpec {
        &self.spec
    }

    pub fn params(&self) -> &LayerParams {
        &self.params
    }

    /// Run the layer at its declared output exponent.
    ///
    /// The input must carry the layer's declared input exponent.
    pub fn forward(&self, input: &FixedPointValue) -> Result<FixedPointValue> {
        if input.q() != self.spec.input_q {
            return Err(ModelError::ExponentMismatch {
                layer: self.spec.name.clone(),
                expected: self.spec.input_q,
                got: input.q(),
            });
        }
        debug!(layer = %self.spec.name, shape = %input.shape(), "forward");
        let output = match &self.params {
            LayerParams::Conv(p) => conv2d(input, p, self.spec.output_q, self.policy)?,
            LayerParams::Fc(p) => linear(input, p, self.spec.output_q, self.policy)?,
        };
        Ok(output)
    }
}

/// All layers of a network, each usable on its own
#[derive(Debug, Clone)]
pub struct LayerSet {
    layers: Vec<Layer>,
}

impl LayerSet {
    /// Load every layer described by `config` from `params_dir`
    pub fn load<P: AsRef<Path>>(config: &NetworkConfig, params_dir: P) -> Result<Self> {
        config.validate()?;
        let params_dir = params_dir.as_ref();
        let policy = config.negative_shift.into();
        let layers = config
            .layers
            .iter()
            .map(|spec| Layer::load(spec, params_dir, policy))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    /// Build from already constructed layers
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    /// Look up a layer by name
    pub fn get(&self, name: &str) -> Result<&Layer> {
        self.layers
            .iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| ModelError::UnknownLayer(name.to_string()))
    }

    /// Run the named layer
    pub fn forward(&self, name: &str, input: &FixedPointValue) -> Result<FixedPointValue> {
        self.get(name)?.forward(input)
    }

    /// Output activation shape `[channels, height, width]` of the named layer
    pub fn output_shape(&self, name: &str) -> Result<[usize; 3]> {
        self.get(name)?.spec().output_shape()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
