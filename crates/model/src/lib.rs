//! fixsim Model I/O
//!
//! Loading and saving of int8 weights and activations, the JSON network
//! description, and a named set of loaded layers. Everything that touches the
//! filesystem lives here; the kernels never do.

mod config;
mod error;
mod export;
mod layers;
mod loader;

pub use config::{LayerKind, LayerSpec, NetworkConfig, ShiftPolicy, WeightFormat};
pub use error::{ModelError, Result};
pub use export::{
    save_activation_binary, save_real_activation_binary, save_real_text, save_weights_binary,
    save_weights_text,
};
pub use layers::{Layer, LayerParams, LayerSet};
pub use loader::{
    load_activation_binary, load_bias_text, load_conv_weights, load_fc_weights, load_weights,
    read_int8_file, read_text_values,
};
