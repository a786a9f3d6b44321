//! Per-tensor conversion: calibrate, select a range, quantize, serialize.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::accumulator::ConversionAccumulator;
use crate::calibration::{select_range, CalibrationStatistics, RangeConfig, RangeSelection};
use crate::config::QuantizationOptions;
use crate::errors::Result;
use crate::format::{write_tensor_file, TensorPayload};
use crate::quantization::{FidelityMetrics, QuantizationOutcome, QuantizationResult, Quantizer};
use crate::tensor::{Precision, Tensor, TensorRole};

/// Where and how a tensor should be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub precision: Precision,
    pub role: TensorRole,
    /// Swap the two dimensions of a rank-2 tensor before storing it.
    pub transpose: bool,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            precision: Precision::Int8,
            role: TensorRole::Weight,
            transpose: false,
        }
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_role(mut self, role: TensorRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }
}

/// What happened to one tensor.
#[derive(Debug, Clone)]
pub struct TensorReport {
    pub path: PathBuf,
    /// Shape as stored, after any transpose.
    pub shape: Vec<usize>,
    pub precision: Precision,
    pub outcome: QuantizationOutcome,
    /// Present when an INT8 candidate went through range selection.
    pub range: Option<RangeSelection>,
    pub metrics: Option<FidelityMetrics>,
    pub saturation_warning: bool,
    pub parameters: usize,
    pub byte_length: u64,
}

/// Runs the four conversion stages for one tensor at a time.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    range: RangeConfig,
    quantizer: Quantizer,
}

impl Converter {
    pub fn new(options: &QuantizationOptions) -> Self {
        Self {
            range: options.range_config(),
            quantizer: Quantizer::new(options.quant_config()),
        }
    }

    /// Convert `tensor` into the file named by `target` and fold the result
    /// into `acc`.
    ///
    /// The accumulator is only touched once the file is fully written, so a
    /// failed write leaves the run statistics as they were.
    pub fn convert(
        &self,
        tensor: &Tensor,
        target: &OutputTarget,
        acc: &mut ConversionAccumulator,
    ) -> Result<TensorReport> {
        let transposed = if target.transpose { tensor.transpose_2d() } else { None };
        let stored: Cow<'_, Tensor> = match transposed {
            Some(t) => Cow::Owned(t),
            None => Cow::Borrowed(tensor),
        };

        let (result, range) = match self.quantizer.preflight(target.precision, target.role) {
            Some(outcome) => (QuantizationResult::from(outcome), None),
            None => {
                let stats = CalibrationStatistics::from_tensor(&stored);
                tracing::debug!(
                    mean = stats.mean,
                    std = stats.std,
                    min = stats.min,
                    max = stats.max,
                    "calibrated {}",
                    display_name(&target.path)
                );
                let selection = select_range(&stored, &stats, &self.range);
                (self.quantizer.evaluate_int8(&stored, &selection.range), Some(selection))
            }
        };

        let payload = match (&result.outcome, result.quantized()) {
            (QuantizationOutcome::Int8Quantized { scale, .. }, Some(q)) => TensorPayload::Int8 {
                codes: &q.data,
                scale: *scale,
            },
            (QuantizationOutcome::Float32Passthrough, _) => TensorPayload::Float32(stored.data()),
            _ => TensorPayload::Float16(stored.data()),
        };

        tracing::info!(
            "Saving {}: {} {:?}",
            display_name(&target.path),
            payload.precision(),
            stored.shape()
        );
        let header = write_tensor_file(&target.path, stored.shape(), &payload)?;

        let report = TensorReport {
            path: target.path.clone(),
            shape: header.shape,
            precision: header.precision,
            outcome: result.outcome,
            range,
            metrics: result.metrics,
            saturation_warning: result.saturation_warning,
            parameters: stored.len(),
            byte_length: header.byte_length,
        };
        acc.record(&report);
        Ok(report)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
