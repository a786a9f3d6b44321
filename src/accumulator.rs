//! Run-level statistics folded across every tensor of a conversion.

use std::fmt;

use serde::Serialize;

use crate::calibration::stats;
use crate::pipeline::TensorReport;
use crate::quantization::QuantizationOutcome;

/// Counters and metric lists for one conversion run.
///
/// Owned by the caller and threaded through each
/// [`Converter::convert`](crate::pipeline::Converter::convert). Workers that
/// convert tensors in parallel keep one accumulator each and
/// [`merge`](Self::merge) them at the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionAccumulator {
    pub total_tensors: usize,
    pub total_parameters: usize,
    pub quantized_tensors: usize,
    pub quantized_parameters: usize,
    pub float16_tensors: usize,
    pub float32_tensors: usize,
    pub mse_values: Vec<f64>,
    pub snr_values: Vec<f64>,
    pub cosine_values: Vec<f64>,
    pub saturation_warnings: usize,
    pub low_snr_fallbacks: usize,
    /// Payload bytes written, headers excluded.
    pub stored_bytes: u64,
}

impl ConversionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one converted tensor into the run.
    pub fn record(&mut self, report: &TensorReport) {
        self.total_tensors += 1;
        self.total_parameters += report.parameters;
        self.stored_bytes += report.byte_length;

        match report.outcome {
            QuantizationOutcome::Int8Quantized { .. } => {
                self.quantized_tensors += 1;
                self.quantized_parameters += report.parameters;
                if let Some(m) = report.metrics {
                    self.mse_values.push(m.mse);
                    self.snr_values.push(m.snr_db);
                    self.cosine_values.push(m.cosine_similarity);
                }
                if report.saturation_warning {
                    self.saturation_warnings += 1;
                }
            }
            QuantizationOutcome::Float16Fallback { .. } => self.float16_tensors += 1,
            QuantizationOutcome::Float32Passthrough => self.float32_tensors += 1,
        }

        if report.outcome.is_snr_fallback() {
            self.low_snr_fallbacks += 1;
        }
    }

    /// Absorb another worker's accumulator.
    pub fn merge(&mut self, other: ConversionAccumulator) {
        self.total_tensors += other.total_tensors;
        self.total_parameters += other.total_parameters;
        self.quantized_tensors += other.quantized_tensors;
        self.quantized_parameters += other.quantized_parameters;
        self.float16_tensors += other.float16_tensors;
        self.float32_tensors += other.float32_tensors;
        self.mse_values.extend(other.mse_values);
        self.snr_values.extend(other.snr_values);
        self.cosine_values.extend(other.cosine_values);
        self.saturation_warnings += other.saturation_warnings;
        self.low_snr_fallbacks += other.low_snr_fallbacks;
        self.stored_bytes += other.stored_bytes;
    }

    /// Summary report, or `None` when no tensor was stored as INT8.
    pub fn summary(&self, snr_threshold: f32) -> Option<ConversionSummary> {
        if self.quantized_tensors == 0 {
            return None;
        }

        let original_bytes = self.total_parameters as u64 * 4;
        let compression_ratio = if self.stored_bytes > 0 {
            original_bytes as f64 / self.stored_bytes as f64
        } else {
            1.0
        };

        Some(ConversionSummary {
            mse: MetricSummary::from_values(&self.mse_values),
            snr_db: MetricSummary::from_values(&self.snr_values),
            cosine_similarity: MetricSummary::from_values(&self.cosine_values),
            total_tensors: self.total_tensors,
            int8_tensors: self.quantized_tensors,
            float16_tensors: self.float16_tensors,
            float32_tensors: self.float32_tensors,
            low_snr_fallbacks: self.low_snr_fallbacks,
            saturation_warnings: self.saturation_warnings,
            total_parameters: self.total_parameters,
            quantized_parameters: self.quantized_parameters,
            compression_ratio,
            snr_threshold,
        })
    }
}

/// Mean / median / min / max of one metric across quantized tensors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: f64::NAN,
                median: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
            };
        }

        Self {
            mean: values.iter().sum::<f64>() / values.len() as f64,
            median: stats::median(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Advisory end-of-run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionSummary {
    pub mse: MetricSummary,
    pub snr_db: MetricSummary,
    pub cosine_similarity: MetricSummary,
    pub total_tensors: usize,
    pub int8_tensors: usize,
    pub float16_tensors: usize,
    pub float32_tensors: usize,
    pub low_snr_fallbacks: usize,
    pub saturation_warnings: usize,
    pub total_parameters: usize,
    pub quantized_parameters: usize,
    /// FP32 bytes over stored payload bytes.
    pub compression_ratio: f64,
    pub snr_threshold: f32,
}

impl fmt::Display for ConversionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Quantization Summary:")?;
        writeln!(
            f,
            "MSE - Mean: {:.2e}, Max: {:.2e}, Median: {:.2e}, Min: {:.2e}",
            self.mse.mean, self.mse.max, self.mse.median, self.mse.min
        )?;
        writeln!(
            f,
            "SNR - Mean: {:.1}dB, Max: {:.1}dB, Median: {:.1}dB, Min: {:.1}dB",
            self.snr_db.mean, self.snr_db.max, self.snr_db.median, self.snr_db.min
        )?;
        writeln!(
            f,
            "CosSim - Mean: {:.6}, Max: {:.6}, Median: {:.6}, Min: {:.6}",
            self.cosine_similarity.mean,
            self.cosine_similarity.max,
            self.cosine_similarity.median,
            self.cosine_similarity.min
        )?;
        writeln!(
            f,
            "Saturation warnings: {}, compression: {:.2}x",
            self.saturation_warnings, self.compression_ratio
        )?;
        write!(
            f,
            "Processed {} INT8 tensors, {} FP16 tensors, {} FP32 tensors ({} SNR<{}dB fallbacks)",
            self.int8_tensors,
            self.float16_tensors,
            self.float32_tensors,
            self.low_snr_fallbacks,
            self.snr_threshold
        )
    }
}
