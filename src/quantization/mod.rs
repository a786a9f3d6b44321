//! Symmetric INT8 quantization and the INT8 / FP16 / FP32 decision.

use std::fmt;

use crate::calibration::ClipRange;
use crate::tensor::{Precision, Tensor, TensorRole};

pub mod metrics;

pub use metrics::FidelityMetrics;

/// Largest code magnitude used by the symmetric mapping.
pub const QMAX: f32 = 127.0;
pub const QMIN: f32 = -128.0;

/// Quantizer configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantConfig {
    /// INT8 candidates below this SNR (dB) fall back to FP16.
    pub snr_threshold: f32,
    /// Saturated share, in percent, above which a warning is recorded.
    pub saturation_warning_threshold: f32,
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            snr_threshold: 20.0,
            saturation_warning_threshold: 0.1,
        }
    }
}

/// Symmetric quantization parameters (zero-point fixed at 0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    scale: f32,
}

impl QuantParams {
    /// `scale = max(|low|, |high|) / 127`, or 1.0 when that is zero or not
    /// a positive finite number.
    pub fn symmetric(range: &ClipRange) -> Self {
        let scale = range.abs_max() / QMAX;
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        Self { scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn quantize(&self, value: f32) -> i8 {
        (value / self.scale).round().clamp(QMIN, QMAX) as i8
    }

    pub fn dequantize(&self, value: i8) -> f32 {
        value as f32 * self.scale
    }
}

/// INT8 codes for one tensor, in the tensor's element order.
#[derive(Debug, Clone)]
pub struct QuantizedTensor {
    pub data: Vec<i8>,
    pub shape: Vec<usize>,
    pub params: QuantParams,
}

impl QuantizedTensor {
    pub fn from_tensor(tensor: &Tensor, range: &ClipRange) -> Self {
        let params = QuantParams::symmetric(range);
        let data = tensor.data().iter().map(|&v| params.quantize(v)).collect();

        Self {
            data,
            shape: tensor.shape().to_vec(),
            params,
        }
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&q| self.params.dequantize(q)).collect()
    }

    /// Fraction of codes at the extreme (`|q| >= 127`). Clipped values land
    /// on -128 and count as saturated too.
    pub fn saturated_fraction(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let saturated = self.data.iter().filter(|&&q| q.unsigned_abs() >= 127).count();
        saturated as f32 / self.data.len() as f32
    }
}

/// Why a tensor was stored as FP16.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FallbackReason {
    /// FP16 was asked for directly.
    Requested,

    /// Normalization weights are never stored as INT8.
    NormalizationWeight,

    /// The INT8 candidate's SNR was below the threshold.
    LowSnr { snr_db: f64 },

    /// The tensor holds NaN or infinite values.
    NonFinite,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Requested => write!(f, "requested"),
            FallbackReason::NormalizationWeight => write!(f, "normalization weight"),
            FallbackReason::LowSnr { snr_db } => write!(f, "low SNR ({snr_db:.1} dB)"),
            FallbackReason::NonFinite => write!(f, "non-finite values"),
        }
    }
}

/// Exactly one encoding decision per tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizationOutcome {
    Int8Quantized { scale: f32, saturated_fraction: f32 },
    Float16Fallback { reason: FallbackReason },
    Float32Passthrough,
}

impl QuantizationOutcome {
    pub fn precision(&self) -> Precision {
        match self {
            QuantizationOutcome::Int8Quantized { .. } => Precision::Int8,
            QuantizationOutcome::Float16Fallback { .. } => Precision::Float16,
            QuantizationOutcome::Float32Passthrough => Precision::Float32,
        }
    }

    pub fn is_snr_fallback(&self) -> bool {
        matches!(
            self,
            QuantizationOutcome::Float16Fallback { reason: FallbackReason::LowSnr { .. } }
        )
    }
}

/// What the quantizer decided, plus the evidence behind it.
#[derive(Debug, Clone)]
pub struct QuantizationResult {
    pub outcome: QuantizationOutcome,
    /// Present whenever an INT8 candidate was evaluated, accepted or not.
    pub metrics: Option<FidelityMetrics>,
    pub saturation_warning: bool,
    quantized: Option<QuantizedTensor>,
}

impl QuantizationResult {
    fn decided(outcome: QuantizationOutcome) -> Self {
        Self {
            outcome,
            metrics: None,
            saturation_warning: false,
            quantized: None,
        }
    }

    /// The accepted INT8 codes, if the outcome is INT8.
    pub fn quantized(&self) -> Option<&QuantizedTensor> {
        self.quantized.as_ref()
    }
}

impl From<QuantizationOutcome> for QuantizationResult {
    fn from(outcome: QuantizationOutcome) -> Self {
        Self::decided(outcome)
    }
}

/// Main quantizer
#[derive(Debug, Clone, Default)]
pub struct Quantizer {
    config: QuantConfig,
}

impl Quantizer {
    pub fn new(config: QuantConfig) -> Self {
        Self { config }
    }

    /// Settle the outcome without looking at the data, when the requested
    /// precision and role already determine it. `None` means an INT8
    /// candidate has to be evaluated.
    pub fn preflight(&self, requested: Precision, role: TensorRole) -> Option<QuantizationOutcome> {
        match (requested, role) {
            (Precision::Float32, _) => Some(QuantizationOutcome::Float32Passthrough),
            (Precision::Float16, _) => Some(QuantizationOutcome::Float16Fallback {
                reason: FallbackReason::Requested,
            }),
            (Precision::Int8, TensorRole::Norm) => Some(QuantizationOutcome::Float16Fallback {
                reason: FallbackReason::NormalizationWeight,
            }),
            (Precision::Int8, TensorRole::Weight) => None,
        }
    }

    /// Decide the encoding for `tensor`, evaluating an INT8 candidate
    /// against `range` when the request allows it.
    pub fn quantize(
        &self,
        tensor: &Tensor,
        range: &ClipRange,
        requested: Precision,
        role: TensorRole,
    ) -> QuantizationResult {
        match self.preflight(requested, role) {
            Some(outcome) => QuantizationResult::decided(outcome),
            None => self.evaluate_int8(tensor, range),
        }
    }

    /// Quantize `tensor` symmetrically against `range`, measure fidelity and
    /// accept or reject the result.
    pub fn evaluate_int8(&self, tensor: &Tensor, range: &ClipRange) -> QuantizationResult {
        if !range.abs_max().is_finite() {
            tracing::warn!(shape = ?tensor.shape(), "non-finite values, storing as FP16");
            return QuantizationResult::decided(QuantizationOutcome::Float16Fallback {
                reason: FallbackReason::NonFinite,
            });
        }

        let quantized = QuantizedTensor::from_tensor(tensor, range);
        let metrics = FidelityMetrics::compute(tensor.data(), &quantized.to_f32());

        // NaN inside a finite range would otherwise slip past the SNR comparison
        if metrics.snr_db.is_nan() {
            tracing::warn!(shape = ?tensor.shape(), "non-finite fidelity metrics, storing as FP16");
            return QuantizationResult {
                outcome: QuantizationOutcome::Float16Fallback {
                    reason: FallbackReason::NonFinite,
                },
                metrics: Some(metrics),
                saturation_warning: false,
                quantized: None,
            };
        }

        let saturated_fraction = quantized.saturated_fraction();
        let saturation_warning =
            saturated_fraction * 100.0 > self.config.saturation_warning_threshold;

        if metrics.snr_db < self.config.snr_threshold as f64 {
            tracing::warn!(
                snr_db = metrics.snr_db,
                threshold = self.config.snr_threshold,
                "INT8 rejected, falling back to FP16"
            );
            return QuantizationResult {
                outcome: QuantizationOutcome::Float16Fallback {
                    reason: FallbackReason::LowSnr { snr_db: metrics.snr_db },
                },
                metrics: Some(metrics),
                saturation_warning,
                quantized: None,
            };
        }

        if saturation_warning {
            tracing::warn!(
                saturated_percent = saturated_fraction * 100.0,
                "high INT8 saturation"
            );
        }

        QuantizationResult {
            outcome: QuantizationOutcome::Int8Quantized {
                scale: quantized.params.scale(),
                saturated_fraction,
            },
            metrics: Some(metrics),
            saturation_warning,
            quantized: Some(quantized),
        }
    }
}
