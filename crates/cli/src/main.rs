//! fixsim command line
//!
//! Runs the golden verification suite, single layers, and the int8 file
//! conversions used to prepare golden data.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fixsim_fixed_point::{dequantize, Shape};
use fixsim_harness::{GoldenSuite, HarnessConfig, Outcome, SuiteReport};
use fixsim_model::{
    load_activation_binary, read_int8_file, read_text_values, save_activation_binary,
    save_real_activation_binary, save_real_text, Layer, LayerSet, NetworkConfig,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "fixsim")]
#[command(version)]
#[command(about = "Bit-exact model of a fixed-point int8 accelerator datapath")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every layer against the recorded golden cases
    Verify {
        /// Directory holding one subdirectory per case [env: FIXSIM_DATA_DIR]
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Directory holding the weight files [env: FIXSIM_PARAMS_DIR]
        #[arg(long)]
        params_dir: Option<PathBuf>,

        /// JSON network description [env: FIXSIM_NETWORK_CONFIG]
        #[arg(long)]
        network: Option<PathBuf>,

        /// Comma-separated case names [env: FIXSIM_CASES]
        #[arg(long, value_delimiter = ',')]
        cases: Option<Vec<String>>,

        /// Print the full report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run one layer on an int8 activation file
    RunLayer {
        /// Layer name
        #[arg(short, long)]
        layer: String,

        /// Input activation (raw int8, the layer's declared input shape)
        #[arg(short, long)]
        input: PathBuf,

        /// Output activation file
        #[arg(short, long)]
        output: PathBuf,

        /// Directory holding the weight files
        #[arg(long, default_value = "data/parameters")]
        params_dir: PathBuf,

        /// JSON network description (reference network when omitted)
        #[arg(long)]
        network: Option<PathBuf>,
    },

    /// Quantize text floats into a raw int8 activation file
    Quantize {
        /// Whitespace-separated real values
        #[arg(short, long)]
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Activation shape, e.g. `1,32,32` (flat `[n,1,1]` when omitted)
        #[arg(long, value_delimiter = ',')]
        shape: Option<Vec<usize>>,

        /// Scale factor (derived from the data when omitted)
        #[arg(long)]
        scale: Option<f64>,
    },

    /// Dequantize a raw int8 file into text floats
    Dequantize {
        /// Raw int8 file
        #[arg(short, long)]
        input: PathBuf,

        /// Output text file
        #[arg(short, long)]
        output: PathBuf,

        /// Scale factor the values were quantized with
        #[arg(long, default_value = "1.0")]
        scale: f64,
    },

    /// Print the network description as JSON
    ShowConfig {
        /// JSON network description (reference network when omitted)
        #[arg(long)]
        network: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fixsim=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            data_dir,
            params_dir,
            network,
            cases,
            json,
        } => {
            let mut config = HarnessConfig::from_env();
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(dir) = params_dir {
                config.params_dir = dir;
            }
            if network.is_some() {
                config.network_config = network;
            }
            if let Some(cases) = cases {
                config.cases = cases;
            }
            run_verify(&config, json)?;
        }
        Commands::RunLayer {
            layer,
            input,
            output,
            params_dir,
            network,
        } => {
            run_layer(&layer, &input, &output, &params_dir, network.as_deref())?;
        }
        Commands::Quantize {
            input,
            output,
            shape,
            scale,
        } => {
            run_quantize(&input, &output, shape, scale)?;
        }
        Commands::Dequantize {
            input,
            output,
            scale,
        } => {
            run_dequantize(&input, &output, scale)?;
        }
        Commands::ShowConfig { network } => {
            let config = load_network(network.as_deref())?;
            println!("{}", config.to_json_string()?);
        }
    }

    Ok(())
}

fn load_network(path: Option<&Path>) -> Result<NetworkConfig> {
    match path {
        Some(p) => NetworkConfig::from_json_file(p)
            .with_context(|| format!("loading network description {}", p.display())),
        None => Ok(NetworkConfig::reference()),
    }
}

fn run_verify(config: &HarnessConfig, json: bool) -> Result<()> {
    config.validate()?;
    let network = config.network()?;
    let layers = LayerSet::load(&network, &config.params_dir)
        .with_context(|| format!("loading parameters from {}", config.params_dir.display()))?;
    info!(
        layers = layers.len(),
        cases = config.cases.len(),
        data_dir = %config.data_dir.display(),
        "running golden suite"
    );

    let report = GoldenSuite::new(&layers, &config.data_dir, config.cases.clone()).run();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    report.ensure_passed()?;
    Ok(())
}

fn print_report(report: &SuiteReport) {
    for case in &report.cases {
        println!("{}:", case.case);
        for layer in &case.layers {
            match (&layer.outcome, &layer.comparison) {
                (Some(outcome), Some(c)) => {
                    let label = match outcome {
                        Outcome::Exact => "[EXACT]",
                        Outcome::WithinTolerance => "[CLOSE]",
                        Outcome::Mismatch => "[FAIL] ",
                    };
                    print!("  {} {:<8} shape {:?}", label, layer.layer, c.actual_shape);
                    if let (Some(max), Some(mean)) = (&c.max_diff, c.mean_abs_diff) {
                        print!(
                            "  max diff {} at {:?} ({} vs {})  mean diff {:.6}",
                            max.diff, max.index, max.actual, max.expected, mean
                        );
                    } else if !c.comparable {
                        print!("  expected shape {:?}", c.expected_shape);
                    }
                    println!();
                }
                _ => println!(
                    "  [ERROR] {:<8} {}",
                    layer.layer,
                    layer.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }
    }
    let s = &report.summary;
    println!(
        "\n{} cases, {} layer runs: {} exact, {} within tolerance, {} mismatched, {} errors",
        s.cases, s.layer_runs, s.exact, s.within_tolerance, s.mismatched, s.errors
    );
}

fn run_layer(
    name: &str,
    input: &Path,
    output: &Path,
    params_dir: &Path,
    network: Option<&Path>,
) -> Result<()> {
    let config = load_network(network)?;
    let spec = config
        .layer(name)
        .with_context(|| format!("no layer named {name}"))?;
    let layer = Layer::load_named(&config, name, params_dir)
        .with_context(|| format!("loading {name} parameters from {}", params_dir.display()))?;

    let x = load_activation_binary(input, spec.input_shape, spec.input_q)?;
    let y = layer.forward(&x)?;
    let [c, h, w] = spec.output_shape()?;
    let y = y.reshape(Shape::nchw(1, c, h, w))?;
    save_activation_binary(&y, output)?;

    println!(
        "{}: {} -> {} (q={}), written to {}",
        name,
        x.shape(),
        y.shape(),
        y.q(),
        output.display()
    );
    Ok(())
}

fn run_quantize(
    input: &Path,
    output: &Path,
    shape: Option<Vec<usize>>,
    scale: Option<f64>,
) -> Result<()> {
    let values = read_text_values(input)?;
    let shape = match shape {
        Some(dims) if dims.len() == 3 || dims.len() == 4 => Shape::new(dims),
        Some(dims) => bail!("shape must have 3 or 4 dimensions, got {}", dims.len()),
        None => Shape::new(vec![values.len(), 1, 1]),
    };
    let used = save_real_activation_binary(&values, &shape, output, scale)?;
    // Only the first batch entry of a 4-D shape is written
    let written = if shape.rank() == 4 { shape.per_batch() } else { shape.numel() };
    println!("quantized {} values at scale {} to {}", written, used, output.display());
    Ok(())
}

fn run_dequantize(input: &Path, output: &Path, scale: f64) -> Result<()> {
    if !(scale.is_finite() && scale > 0.0) {
        bail!("scale must be a positive finite number, got {scale}");
    }
    let len = std::fs::metadata(input)
        .with_context(|| format!("reading {}", input.display()))?
        .len() as usize;
    let raw = read_int8_file(input, len)?;
    let real = dequantize(&raw, scale);
    save_real_text(&real, output)?;
    println!("dequantized {} values at scale {} to {}", real.len(), scale, output.display());
    Ok(())
}
