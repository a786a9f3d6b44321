//! Convert a synthetic transformer layer
//!
//! Run with: cargo run --example convert_synthetic

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use weightpack::{
    ConversionAccumulator, Converter, OutputTarget, Precision, QuantizationOptions,
    QuantizationOutcome, Tensor, TensorRole,
};

/// Box-Muller normal samples scaled by `std`.
fn gaussian(rng: &mut StdRng, n: usize, std: f32) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
            let u2: f32 = rng.gen();
            std * (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
        })
        .collect()
}

fn main() -> Result<()> {
    println!("=== Synthetic Layer Conversion ===\n");

    let mut rng = StdRng::seed_from_u64(7);
    let hidden = 256;
    let ffn = 704;

    // 1. Build tensors
    let mut down = gaussian(&mut rng, ffn * hidden, 0.02);
    // a few activation-outlier columns, as seen in real down projections
    for i in (0..down.len()).step_by(4099) {
        down[i] *= 60.0;
    }
    let norm: Vec<f32> = (0..hidden).map(|_| 1.0 + rng.gen_range(-0.05..0.05)).collect();

    let attn_q = Tensor::new(gaussian(&mut rng, hidden * hidden, 0.02), vec![hidden, hidden])?;
    let ffn_up = Tensor::new(gaussian(&mut rng, ffn * hidden, 0.02), vec![ffn, hidden])?;

    let layer = vec![
        ("layer_0_attn_q", attn_q, TensorRole::Weight),
        ("layer_0_ffn_up", ffn_up, TensorRole::Weight),
        ("layer_0_ffn_down", Tensor::new(down, vec![hidden, ffn])?, TensorRole::Weight),
        ("layer_0_input_norm", Tensor::new(norm, vec![hidden])?, TensorRole::Norm),
    ];
    println!("✓ Built {} tensors\n", layer.len());

    // 2. Convert
    let out_dir = std::env::temp_dir().join("weightpack_demo");
    std::fs::create_dir_all(&out_dir)?;

    let options = QuantizationOptions::default();
    let converter = Converter::new(&options);
    let mut acc = ConversionAccumulator::new();

    for (name, tensor, role) in &layer {
        let target = OutputTarget::new(out_dir.join(format!("{name}.weights")))
            .with_precision(Precision::Int8)
            .with_role(*role);
        let report = converter.convert(tensor, &target, &mut acc)?;

        match report.outcome {
            QuantizationOutcome::Int8Quantized { scale, saturated_fraction } => println!(
                "   {:<20} INT8  scale {:.6}  saturated {:.3}%  method {}",
                name,
                scale,
                saturated_fraction * 100.0,
                report.range.map(|r| r.method.to_string()).unwrap_or_default()
            ),
            QuantizationOutcome::Float16Fallback { reason } => {
                println!("   {:<20} FP16  ({})", name, reason)
            }
            QuantizationOutcome::Float32Passthrough => println!("   {:<20} FP32", name),
        }
    }

    // 3. Summary
    println!();
    if let Some(summary) = acc.summary(options.snr_threshold) {
        println!("{summary}");
    }
    println!("\n✓ Files written to {}", out_dir.display());

    Ok(())
}
