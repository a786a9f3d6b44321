use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;
use weightpack::QuantizationOptions;

mod cli;

use cli::commands;

#[derive(Parser)]
#[command(
    name = "weightpack",
    version,
    about = "Weight tensor quantization and packing toolkit",
    long_about = "Convert float32 weight tensors to calibrated INT8, FP16 or FP32 tensor files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Quantization parameters shared by every converting command.
#[derive(Args, Debug, Clone)]
struct ThresholdArgs {
    /// Minimum SNR (dB) for INT8 quantization, fallback to FP16 below this
    #[arg(long, default_value_t = 20.0)]
    snr_threshold: f32,

    /// Saturation threshold for outlier clipping (0.0-1.0)
    #[arg(long, default_value_t = 0.01)]
    saturation_threshold: f32,

    /// Percentile for outlier detection (0.0-50.0)
    #[arg(long, default_value_t = 0.01)]
    outlier_percentile: f32,

    /// Standard deviation multiplier for range clipping
    #[arg(long, default_value_t = 3.5)]
    sigma_multiplier: f32,

    /// Minimum range preservation ratio (0.0-1.0)
    #[arg(long, default_value_t = 0.5)]
    range_threshold: f32,

    /// Saturation percentage threshold for warnings
    #[arg(long, default_value_t = 0.1)]
    saturation_warning_threshold: f32,
}

impl From<&ThresholdArgs> for QuantizationOptions {
    fn from(args: &ThresholdArgs) -> Self {
        QuantizationOptions {
            saturation_threshold: args.saturation_threshold,
            outlier_percentile: args.outlier_percentile,
            sigma_multiplier: args.sigma_multiplier,
            range_threshold: args.range_threshold,
            snr_threshold: args.snr_threshold,
            saturation_warning_threshold: args.saturation_warning_threshold,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a single .npy tensor
    Convert {
        #[arg(value_name = "TENSOR")]
        input: String,

        #[arg(short, long, required = true)]
        output: String,

        #[arg(short, long, default_value = "int8")]
        precision: String,

        /// weight or norm; norm tensors are never stored as INT8
        #[arg(long, default_value = "weight")]
        role: String,

        #[arg(long)]
        transpose: bool,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Write the run summary as JSON
        #[arg(long, value_name = "FILE")]
        report: Option<String>,
    },

    /// Convert every .npy tensor in a directory
    Batch {
        #[arg(value_name = "DIR")]
        input_dir: String,

        #[arg(short, long, required = true)]
        output: String,

        #[arg(short, long, default_value = "int8")]
        precision: String,

        #[arg(long)]
        skip_existing: bool,

        #[arg(long)]
        continue_on_error: bool,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        #[arg(long, value_name = "FILE")]
        report: Option<String>,
    },

    /// Show the header and contents of a tensor file
    Inspect {
        #[arg(value_name = "FILE")]
        input: String,
    },

    /// Run a YAML/TOML conversion plan
    Config {
        #[arg(value_name = "CONFIG")]
        config_file: String,

        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    println!("{}", format!("weightpack v{}", weightpack::VERSION).bold().cyan());
    println!();

    match cli.command {
        Commands::Convert {
            input,
            output,
            precision,
            role,
            transpose,
            thresholds,
            report,
        } => {
            let request = commands::ConvertRequest {
                input: &input,
                output: &output,
                precision: &precision,
                role: &role,
                transpose,
            };
            commands::convert(&request, (&thresholds).into(), report.as_deref())?;
        }
        Commands::Batch {
            input_dir,
            output,
            precision,
            skip_existing,
            continue_on_error,
            thresholds,
            report,
        } => {
            let options = commands::BatchOptions {
                skip_existing,
                continue_on_error,
            };
            commands::batch(
                &input_dir,
                &output,
                &precision,
                options,
                (&thresholds).into(),
                report.as_deref(),
            )?;
        }
        Commands::Inspect { input } => {
            commands::inspect(&input)?;
        }
        Commands::Config { config_file, dry_run } => {
            commands::run_config(&config_file, dry_run)?;
        }
    }

    Ok(())
}
