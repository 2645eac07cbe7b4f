//! Network description

use std::collections::HashSet;
use std::path::Path;

use fixsim_fixed_point::NegativeShift;
use fixsim_kernels::{conv_output_size, ConvGeometry};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// On-disk encoding of a weight file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFormat {
    /// Raw int8 bytes
    #[default]
    Binary,
    /// Whitespace-separated numbers
    Text,
}

/// Handling of a negative requantization shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftPolicy {
    #[default]
    LeftShift,
    Reject,
}

impl From<ShiftPolicy> for NegativeShift {
    fn from(policy: ShiftPolicy) -> Self {
        match policy {
            ShiftPolicy::LeftShift => NegativeShift::LeftShift,
            ShiftPolicy::Reject => NegativeShift::Reject,
        }
    }
}

/// Layer type and geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerKind {
    Conv {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    Fc {
        in_features: usize,
        out_features: usize,
    },
}

fn default_stride() -> usize { 1 }

/// One layer of the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Layer name; also the prefix of its golden files
    pub name: String,

    #[serde(flatten)]
    pub kind: LayerKind,

    /// Activation shape `[channels, height, width]` fed to this layer
    pub input_shape: [usize; 3],

    /// Exponent of the incoming activation
    #[serde(default)]
    pub input_q: i32,

    /// Exponent of the weights
    pub weight_q: i32,

    /// Exponent requested for the output
    #[serde(default)]
    pub output_q: i32,

    /// Weight file, relative to the parameter directory
    pub weights: String,

    #[serde(default)]
    pub weight_format: WeightFormat,

    /// Optional bias file (text, accumulator scale), relative to the parameter directory
    #[serde(default)]
    pub bias: Option<String>,
}

impl LayerSpec {
    /// Convolution geometry, if this is a convolution layer
    pub fn conv_geometry(&self) -> Result<Option<ConvGeometry>> {
        match self.kind {
            LayerKind::Conv {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            } => Ok(Some(ConvGeometry::new(
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
            )?)),
            LayerKind::Fc { .. } => Ok(None),
        }
    }

    /// Requantization shift implied by the exponents
    pub fn shift(&self) -> i64 {
        self.input_q as i64 + self.weight_q as i64 - self.output_q as i64
    }

    /// Output activation shape `[channels, height, width]`.
    ///
    /// Dense outputs are reported as `[features, 1, 1]`, the layout their
    /// golden files use.
    pub fn output_shape(&self) -> Result<[usize; 3]> {
        let [_, h, w] = self.input_shape;
        match self.kind {
            LayerKind::Conv {
                out_channels,
                kernel_size,
                stride,
                padding,
                ..
            } => {
                let out_h = conv_output_size(h, kernel_size, stride, padding);
                let out_w = conv_output_size(w, kernel_size, stride, padding);
                match (out_h, out_w) {
                    (Some(oh), Some(ow)) => Ok([out_channels, oh, ow]),
                    _ => Err(ModelError::Config(format!(
                        "layer {}: input {}x{} too small for kernel {} with padding {}",
                        self.name, h, w, kernel_size, padding
                    ))),
                }
            }
            LayerKind::Fc { out_features, .. } => Ok([out_features, 1, 1]),
        }
    }

    /// Number of weights the weight file must contain
    pub fn weight_len(&self) -> usize {
        match self.kind {
            LayerKind::Conv {
                in_channels,
                out_channels,
                kernel_size,
                ..
            } => out_channels * in_channels * kernel_size * kernel_size,
            LayerKind::Fc {
                in_features,
                out_features,
            } => in_features * out_features,
        }
    }

    fn validate(&self) -> Result<()> {
        let [c, h, w] = self.input_shape;
        match self.kind {
            LayerKind::Conv { in_channels, .. } => {
                self.conv_geometry()?;
                if c != in_channels {
                    return Err(ModelError::Config(format!(
                        "layer {}: input_shape has {} channels, layer expects {}",
                        self.name, c, in_channels
                    )));
                }
            }
            LayerKind::Fc {
                in_features,
                out_features,
            } => {
                if in_features == 0 || out_features == 0 {
                    return Err(ModelError::Config(format!(
                        "layer {}: feature counts must be positive",
                        self.name
                    )));
                }
                if c * h * w != in_features {
                    return Err(ModelError::Config(format!(
                        "layer {}: input_shape flattens to {} features, layer expects {}",
                        self.name,
                        c * h * w,
                        in_features
                    )));
                }
            }
        }
        self.output_shape()?;
        Ok(())
    }
}

/// A list of independently loaded layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub layers: Vec<LayerSpec>,

    #[serde(default)]
    pub negative_shift: ShiftPolicy,
}

impl NetworkConfig {
    /// Load from a JSON file and validate
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The five-layer reference network.
    ///
    /// Activations sit at `q = 0`, so each layer's `weight_q` equals its
    /// requantization shift (9, 8, 8, 8, 6).
    pub fn reference() -> Self {
        let conv = |name: &str, cin, cout, k, stride, padding, input_shape, weight_q| LayerSpec {
            name: name.to_string(),
            kind: LayerKind::Conv {
                in_channels: cin,
                out_channels: cout,
                kernel_size: k,
                stride,
                padding,
            },
            input_shape,
            input_q: 0,
            weight_q,
            output_q: 0,
            weights: format!("{name}.dat"),
            weight_format: WeightFormat::Binary,
            bias: None,
        };

        let layers = vec![
            conv("conv1", 1, 32, 5, 1, 2, [1, 32, 32], 9),
            conv("conv2", 32, 64, 3, 1, 1, [32, 16, 16], 8),
            conv("conv3", 64, 64, 3, 2, 1, [64, 16, 16], 8),
            conv("conv4", 64, 128, 3, 2, 1, [64, 8, 8], 8),
            LayerSpec {
                name: "fc".to_string(),
                kind: LayerKind::Fc {
                    in_features: 128,
                    out_features: 10,
                },
                input_shape: [128, 1, 1],
                input_q: 0,
                weight_q: 6,
                output_q: 0,
                weights: "fc.dat".to_string(),
                weight_format: WeightFormat::Binary,
                bias: None,
            },
        ];

        Self {
            layers,
            negative_shift: ShiftPolicy::LeftShift,
        }
    }

    /// Look up a layer spec by name
    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(ModelError::Config("network has no layers".into()));
        }
        let mut seen = HashSet::new();
        for layer in &self.layers {
            if !seen.insert(layer.name.as_str()) {
                return Err(ModelError::Config(format!(
                    "duplicate layer name {}",
                    layer.name
                )));
            }
            layer.validate()?;
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::reference()
    }
}
