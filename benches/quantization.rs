//! Criterion benchmarks for weightpack.
//!
//! Run with: `cargo bench`
//!
//! # Benchmark groups
//!
//! 1. **calibrate**: statistics plus clipping range selection at 1 K,
//!    100 K and 1 M elements, on smooth data (no clipping) and on data with
//!    a heavy tail (clipping evaluated).
//!
//! 2. **evaluate_int8**: quantize, reconstruct and score a tensor against a
//!    fixed range at the same sizes.
//!
//! 3. **encode**: serialize INT8, FP16 and FP32 payloads into memory.
//!
//! 4. **convert_layer**: the full `Converter` over a synthetic transformer
//!    layer written to a temp directory.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use weightpack::format::{encode_tensor, TensorPayload};
use weightpack::quantization::QuantizedTensor;
use weightpack::{
    select_range, CalibrationStatistics, ConversionAccumulator, Converter, OutputTarget, Quantizer,
    RangeConfig, Tensor, TensorRole,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deterministic `n` elements in the range [-1, 1].
fn synthetic_f32(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let t = (i as f32) / (n as f32);
            (t * std::f32::consts::TAU).sin()
        })
        .collect()
}

/// Smooth data with every 1000th element blown up by 40x.
fn heavy_tail_f32(n: usize) -> Vec<f32> {
    let mut data = synthetic_f32(n);
    for v in data.iter_mut().step_by(1000) {
        *v *= 40.0;
    }
    data
}

fn vector(data: Vec<f32>) -> Tensor {
    let n = data.len();
    Tensor::new(data, vec![n]).unwrap()
}

// ---------------------------------------------------------------------------
// Group 1: Calibration
// ---------------------------------------------------------------------------

fn bench_calibrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibrate");
    let config = RangeConfig::default();

    for &n in &[1_000_usize, 100_000, 1_000_000] {
        let smooth = vector(synthetic_f32(n));
        let tailed = vector(heavy_tail_f32(n));

        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("smooth", n), &smooth, |b, t| {
            b.iter(|| {
                let stats = CalibrationStatistics::from_tensor(black_box(t));
                select_range(t, &stats, &config)
            });
        });

        group.bench_with_input(BenchmarkId::new("heavy_tail", n), &tailed, |b, t| {
            b.iter(|| {
                let stats = CalibrationStatistics::from_tensor(black_box(t));
                select_range(t, &stats, &config)
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 2: INT8 evaluation
// ---------------------------------------------------------------------------

fn bench_evaluate_int8(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_int8");
    let quantizer = Quantizer::default();

    for &n in &[1_000_usize, 100_000, 1_000_000] {
        let tensor = vector(synthetic_f32(n));
        let stats = CalibrationStatistics::from_tensor(&tensor);
        let range = select_range(&tensor, &stats, &RangeConfig::default()).range;

        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::from_parameter(n), &tensor, |b, t| {
            b.iter(|| quantizer.evaluate_int8(black_box(t), black_box(&range)));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 3: Encoding
// ---------------------------------------------------------------------------

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let (rows, cols) = (1024_usize, 1024_usize);
    let tensor = Tensor::new(synthetic_f32(rows * cols), vec![rows, cols]).unwrap();
    let stats = CalibrationStatistics::from_tensor(&tensor);
    let range = select_range(&tensor, &stats, &RangeConfig::default()).range;
    let quantized = QuantizedTensor::from_tensor(&tensor, &range);

    group.throughput(Throughput::Elements((rows * cols) as u64));

    let payloads = [
        ("int8", TensorPayload::Int8 { codes: &quantized.data, scale: quantized.params.scale() }),
        ("fp16", TensorPayload::Float16(tensor.data())),
        ("fp32", TensorPayload::Float32(tensor.data())),
    ];

    for (name, payload) in &payloads {
        group.bench_function(*name, |b| {
            let mut buf = Vec::with_capacity(rows * cols * 4 + 64);
            b.iter(|| {
                buf.clear();
                encode_tensor(&mut buf, black_box(tensor.shape()), black_box(payload)).unwrap()
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Group 4: Full conversion
// ---------------------------------------------------------------------------

fn bench_convert_layer(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_layer");
    group.sample_size(10);

    // One small transformer layer
    let specs: &[(&str, &[usize], TensorRole)] = &[
        ("attn_q", &[512, 512], TensorRole::Weight),
        ("attn_k", &[128, 512], TensorRole::Weight),
        ("attn_v", &[128, 512], TensorRole::Weight),
        ("attn_o", &[512, 512], TensorRole::Weight),
        ("input_norm", &[512], TensorRole::Norm),
        ("ffn_gate", &[1408, 512], TensorRole::Weight),
        ("ffn_up", &[1408, 512], TensorRole::Weight),
        ("ffn_down", &[512, 1408], TensorRole::Weight),
        ("post_attn_norm", &[512], TensorRole::Norm),
    ];

    let tensors: Vec<(Tensor, &str, TensorRole)> = specs
        .iter()
        .map(|&(name, shape, role)| {
            let n: usize = shape.iter().product();
            (Tensor::new(heavy_tail_f32(n), shape.to_vec()).unwrap(), name, role)
        })
        .collect();

    let total_elements: u64 = tensors.iter().map(|(t, _, _)| t.len() as u64).sum();
    group.throughput(Throughput::Elements(total_elements));

    let dir = tempfile::tempdir().unwrap();
    let converter = Converter::default();

    group.bench_function("int8", |b| {
        b.iter(|| {
            let mut acc = ConversionAccumulator::new();
            for (tensor, name, role) in &tensors {
                let path = dir.path().join(format!("{name}.weights"));
                let target = OutputTarget::new(path).with_role(*role);
                converter.convert(black_box(tensor), &target, &mut acc).unwrap();
            }
            acc
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_calibrate,
    bench_evaluate_int8,
    bench_encode,
    bench_convert_layer
);
criterion_main!(benches);
