//! Command implementations

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use weightpack::format::{read_scale_sidecar, read_tensor_file, sidecar::format_scale, sidecar_path};
use weightpack::{
    CalibrationStatistics, Config, ConversionAccumulator, Converter, OutputTarget, Precision,
    QuantizationOptions, QuantizationOutcome, Tensor, TensorReport, TensorRole,
};

pub struct ConvertRequest<'a> {
    pub input: &'a str,
    pub output: &'a str,
    pub precision: &'a str,
    pub role: &'a str,
    pub transpose: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub skip_existing: bool,
    pub continue_on_error: bool,
}

pub fn convert(
    request: &ConvertRequest<'_>,
    options: QuantizationOptions,
    report: Option<&str>,
) -> Result<()> {
    options.validate()?;
    let target = OutputTarget::new(request.output)
        .with_precision(request.precision.parse()?)
        .with_role(request.role.parse()?)
        .with_transpose(request.transpose);

    println!("📦 Loading tensor: {}", request.input.bold());
    let tensor = Tensor::from_npy(request.input)?;
    println!("✓ Loaded {:?} ({} parameters)", tensor.shape(), tensor.len());
    println!();

    let converter = Converter::new(&options);
    let mut acc = ConversionAccumulator::new();
    let tensor_report = converter.convert(&tensor, &target, &mut acc)?;
    print_tensor_report(&tensor_report);

    finish_run(&acc, &options, report)
}

pub fn batch(
    input_dir: &str,
    output_dir: &str,
    precision: &str,
    batch: BatchOptions,
    options: QuantizationOptions,
    report: Option<&str>,
) -> Result<()> {
    options.validate()?;
    let precision: Precision = precision.parse()?;

    let converter = Converter::new(&options);
    let mut acc = ConversionAccumulator::new();
    convert_directory(
        Path::new(input_dir),
        Path::new(output_dir),
        precision,
        batch,
        &converter,
        &mut acc,
    )?;

    finish_run(&acc, &options, report)
}

pub fn inspect(input: &str) -> Result<()> {
    let path = Path::new(input);
    println!("📊 Tensor file: {}", input.bold());
    println!();

    let file = read_tensor_file(path)?;
    let header = &file.header;

    println!(
        "  Precision:   {} (code {})",
        header.precision.to_string().cyan(),
        header.precision.code()
    );
    println!("  Shape:       {:?}", header.shape);
    println!("  Elements:    {}", header.element_count().unwrap_or_default());
    println!("  Payload:     {} bytes", header.byte_length);

    if let Some(scale) = header.scale {
        println!("  Scale:       {:.10}", scale);
        let sidecar = sidecar_path(path);
        if sidecar.exists() {
            let side = read_scale_sidecar(path)?;
            let expected: f32 = format_scale(scale).trim().parse()?;
            if side == expected {
                println!("  Sidecar:     {:.10} {}", side, "✓ matches header".green());
            } else {
                println!("  Sidecar:     {:.10} {}", side, "✗ differs from header".red());
            }
        } else {
            println!("  Sidecar:     {}", "missing".yellow());
        }
    }
    println!();

    let values = file.to_f32();
    let stats = CalibrationStatistics::from_data(&values);
    println!("  Values:");
    println!("    Mean: {:.6}", stats.mean);
    println!("    Std:  {:.6}", stats.std);
    println!("    Min:  {:.6}", stats.min);
    println!("    Max:  {:.6}", stats.max);

    Ok(())
}

pub fn run_config(config_file: &str, dry_run: bool) -> Result<()> {
    println!("📋 Loading config: {}", config_file.bold());
    let config = Config::from_file(config_file)?;
    config.validate()?;

    println!("✓ {} tensor job(s), default precision {}", config.tensors.len(), config.precision);
    if let Some(batch) = &config.batch {
        println!("  Batch: {} → {}", batch.input_dir, batch.output_dir);
    }
    println!();

    if dry_run {
        println!("{}", "Dry run: nothing will be written".yellow());
        for job in &config.tensors {
            let target = config.target_for(job);
            println!(
                "  {} → {} ({}, {}{})",
                job.input,
                job.output,
                target.precision,
                target.role,
                if target.transpose { ", transposed" } else { "" }
            );
        }
        return Ok(());
    }

    let converter = Converter::new(&config.quantization);
    let mut acc = ConversionAccumulator::new();

    for job in &config.tensors {
        if job.skip_existing && Path::new(&job.output).exists() {
            println!("⏭  Skipping {} (exists)", job.output);
            continue;
        }
        let tensor = Tensor::from_npy(&job.input)?;
        let report = converter.convert(&tensor, &config.target_for(job), &mut acc)?;
        print_tensor_report(&report);
    }

    if let Some(batch) = &config.batch {
        let options = BatchOptions {
            skip_existing: batch.skip_existing,
            continue_on_error: batch.continue_on_error,
        };
        convert_directory(
            Path::new(&batch.input_dir),
            Path::new(&batch.output_dir),
            config.precision,
            options,
            &converter,
            &mut acc,
        )?;
    }

    finish_run(&acc, &config.quantization, None)
}

fn convert_directory(
    input_dir: &Path,
    output_dir: &Path,
    precision: Precision,
    batch: BatchOptions,
    converter: &Converter,
    acc: &mut ConversionAccumulator,
) -> Result<()> {
    let inputs = list_npy_files(input_dir)?;
    if inputs.is_empty() {
        println!("⚠️  No .npy tensors found in {}", input_dir.display());
        return Ok(());
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    println!("🔧 Converting {} tensors to {}...", inputs.len(), precision);
    println!();

    let mut failed = 0usize;
    let mut skipped = 0usize;

    for input in &inputs {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let output = output_dir.join(format!("{stem}.weights"));

        if batch.skip_existing && output.exists() {
            skipped += 1;
            continue;
        }

        let target = OutputTarget::new(&output)
            .with_precision(precision)
            .with_role(TensorRole::from_output_name(&stem));

        let result = match Tensor::from_npy(input) {
            Ok(tensor) => converter.convert(&tensor, &target, acc),
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => print_tensor_report(&report),
            Err(e) if batch.continue_on_error => {
                failed += 1;
                println!("  {} {}: {}", "✗".red(), input.display(), e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!();
    println!(
        "✓ Batch complete: {} converted, {} skipped, {} failed",
        inputs.len() - skipped - failed,
        skipped,
        failed
    );
    Ok(())
}

fn list_npy_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let mut files = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("npy") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn print_tensor_report(report: &TensorReport) {
    let name = report
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match report.outcome {
        QuantizationOutcome::Int8Quantized { scale, .. } => {
            let (snr, cos) = report
                .metrics
                .map(|m| (m.snr_db, m.cosine_similarity))
                .unwrap_or((f64::NAN, f64::NAN));
            let mark = if report.saturation_warning { "⚠".yellow() } else { "✓".green() };
            println!(
                "  {} {:<40} {} {:?}  scale {:.6}  SNR {:.1}dB  cos {:.6}",
                mark, name, "INT8".green(), report.shape, scale, snr, cos
            );
        }
        QuantizationOutcome::Float16Fallback { reason } => {
            println!(
                "  {} {:<40} {} {:?}  ({})",
                "↓".yellow(),
                name,
                "FP16".yellow(),
                report.shape,
                reason
            );
        }
        QuantizationOutcome::Float32Passthrough => {
            println!("  {} {:<40} {} {:?}", "✓".green(), name, "FP32".cyan(), report.shape);
        }
    }
}

fn finish_run(
    acc: &ConversionAccumulator,
    options: &QuantizationOptions,
    report: Option<&str>,
) -> Result<()> {
    println!();
    println!("📊 Results:");
    println!("  Tensors:     {}", acc.total_tensors);
    println!("  Parameters:  {}", acc.total_parameters);
    println!("  Stored size: {:.2} MB", acc.stored_bytes as f64 / 1_048_576.0);
    println!();

    match acc.summary(options.snr_threshold) {
        Some(summary) => {
            println!("{summary}");
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&summary)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write report: {path}"))?;
                println!();
                println!("💾 Report written to {}", path.bold());
            }
        }
        None => {
            println!("{}", "No tensors were stored as INT8".yellow());
        }
    }

    Ok(())
}
