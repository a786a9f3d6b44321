//! Clipping-range selection.
//!
//! A min/max range is fragile when a handful of elements sit far outside the
//! bulk of the distribution. The selector first checks how many elements
//! would saturate under a plain affine INT8 mapping; only when that share is
//! too large does it tighten the range, taking the looser of a percentile
//! bound and a sigma bound on each side. A clip that would discard more than
//! `range_threshold` of the original span is rejected.

use std::fmt;

use super::{stats, CalibrationStatistics};
use crate::tensor::Tensor;

/// Knobs for [`select_range`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConfig {
    /// Trial saturated fraction (`0..=1`) above which clipping is attempted.
    pub saturation_threshold: f32,
    /// Tail percentile in percent; `0.01` means the 0.01th / 99.99th pair.
    pub outlier_percentile: f32,
    /// Width of the `mean ± k·std` bound.
    pub sigma_multiplier: f32,
    /// Minimum share of the original span a clipped range must keep.
    pub range_threshold: f32,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            saturation_threshold: 0.01,
            outlier_percentile: 0.01,
            sigma_multiplier: 3.5,
            range_threshold: 0.5,
        }
    }
}

/// Value interval used to derive a quantization scale.
///
/// Always satisfies `min <= low <= high <= max` against the statistics it
/// was selected from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRange {
    low: f32,
    high: f32,
}

impl ClipRange {
    pub(crate) fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// The full observed `[min, max]` range.
    pub fn unclipped(stats: &CalibrationStatistics) -> Self {
        Self::new(stats.min, stats.max)
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    /// Largest magnitude in the range; the symmetric INT8 scale is derived
    /// from it.
    pub fn abs_max(&self) -> f32 {
        self.low.abs().max(self.high.abs())
    }
}

/// How the final range was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipMethod {
    /// Trial saturation was within tolerance; `[min, max]` kept.
    Unclipped,

    /// `min == max`; nothing to clip.
    ZeroRange,

    /// Percentile/sigma bounds were applied.
    Clipped,

    /// Clipping was attempted but kept too little of the span; `[min, max]` kept.
    ClipRejected,
}

impl fmt::Display for ClipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipMethod::Unclipped => write!(f, "unclipped"),
            ClipMethod::ZeroRange => write!(f, "zero-range"),
            ClipMethod::Clipped => write!(f, "clipped"),
            ClipMethod::ClipRejected => write!(f, "clip-rejected"),
        }
    }
}

/// Result of [`select_range`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSelection {
    pub range: ClipRange,
    pub method: ClipMethod,
    /// Fraction of elements at the extreme code under the trial mapping.
    pub trial_saturation: f32,
}

/// Fraction of elements that land on an extreme code (`|q| >= 127`) under
/// an affine INT8 mapping derived from the unclipped `[min, max]`.
///
/// The trial mapping uses `scale = (max - min) / 255` (1.0 when `min == max`)
/// and a zero-point anchored at `max`.
pub fn trial_saturation(data: &[f32], stats: &CalibrationStatistics) -> f32 {
    if data.is_empty() {
        return 0.0;
    }

    let (min, max) = (stats.min as f64, stats.max as f64);
    let scale = if max != min { (max - min) / 255.0 } else { 1.0 };
    let zero_point = (127.0 - max / scale).round().clamp(-128.0, 127.0);

    let saturated = data
        .iter()
        .filter(|&&v| {
            let q = (v as f64 / scale + zero_point).round().clamp(-128.0, 127.0);
            q.abs() >= 127.0
        })
        .count();

    saturated as f32 / data.len() as f32
}

/// Choose the clipping range for `tensor`.
///
/// Statistics must be finite; non-finite statistics are returned unclipped
/// and left for the quantizer to reject.
pub fn select_range(
    tensor: &Tensor,
    stats: &CalibrationStatistics,
    config: &RangeConfig,
) -> RangeSelection {
    let full = ClipRange::unclipped(stats);

    if !stats.is_finite() {
        return RangeSelection {
            range: full,
            method: ClipMethod::Unclipped,
            trial_saturation: 0.0,
        };
    }

    let trial = trial_saturation(tensor.data(), stats);

    if stats.has_zero_range() {
        return RangeSelection {
            range: full,
            method: ClipMethod::ZeroRange,
            trial_saturation: trial,
        };
    }

    if trial <= config.saturation_threshold {
        return RangeSelection {
            range: full,
            method: ClipMethod::Unclipped,
            trial_saturation: trial,
        };
    }

    let sorted = stats::sorted(tensor.data());
    let tail = (config.outlier_percentile as f64).min(100.0 - config.outlier_percentile as f64);
    let percentile_low = stats::percentile(&sorted, tail);
    let percentile_high = stats::percentile(&sorted, 100.0 - tail);

    let k = config.sigma_multiplier;
    let sigma_low = stats.mean - k * stats.std;
    let sigma_high = stats.mean + k * stats.std;

    let clipped_min = stats.min.max(percentile_low.min(sigma_low));
    let clipped_max = stats.max.min(percentile_high.max(sigma_high));

    tracing::debug!(
        trial_saturation = trial,
        percentile_low,
        percentile_high,
        sigma_low,
        sigma_high,
        clipped_min,
        clipped_max,
        "outlier clipping evaluated"
    );

    if clipped_max - clipped_min < config.range_threshold * stats.span() {
        return RangeSelection {
            range: full,
            method: ClipMethod::ClipRejected,
            trial_saturation: trial,
        };
    }

    RangeSelection {
        range: ClipRange::new(clipped_min, clipped_max),
        method: ClipMethod::Clipped,
        trial_saturation: trial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(
        data: Vec<f32>,
        shape: Vec<usize>,
        config: &RangeConfig,
    ) -> (CalibrationStatistics, RangeSelection) {
        let t = Tensor::new(data, shape).unwrap();
        let stats = CalibrationStatistics::from_tensor(&t);
        let sel = select_range(&t, &stats, config);
        (stats, sel)
    }

    #[test]
    fn test_constant_tensor_is_zero_range() {
        let (_, sel) = select(vec![2.0; 16], vec![4, 4], &RangeConfig::default());
        assert_eq!(sel.range, ClipRange::new(2.0, 2.0));
        assert_eq!(sel.method, ClipMethod::ZeroRange);
    }

    #[test]
    fn test_single_outlier_triggers_clipping() {
        let (stats, sel) = select(vec![0.0, 0.0, 0.0, 100.0], vec![2, 2], &RangeConfig::default());
        assert!(sel.trial_saturation > 0.01);
        assert_ne!(sel.method, ClipMethod::Unclipped);
        assert!(stats.min <= sel.range.low());
        assert!(sel.range.high() <= stats.max);
    }

    #[test]
    fn test_heavy_tail_is_clipped() {
        // 10k near-uniform values in [-1, 1) plus one outlier at 50
        let mut data: Vec<f32> = (0..10_000).map(|i| (i as f32 / 5_000.0) - 1.0).collect();
        data.push(50.0);
        let n = data.len();
        let config = RangeConfig { range_threshold: 0.0, ..Default::default() };
        let (stats, sel) = select(data, vec![n], &config);

        assert_eq!(sel.method, ClipMethod::Clipped);
        assert!(sel.range.high() < stats.max);
        assert!(sel.range.low() >= stats.min);
    }

    #[test]
    fn test_aggressive_clip_is_rejected() {
        let mut data: Vec<f32> = (0..10_000).map(|i| (i as f32 / 5_000.0) - 1.0).collect();
        data.push(50.0);
        let n = data.len();
        // Sigma bound clips to roughly [-1, 2.7] out of [-1, 50]
        let config = RangeConfig { range_threshold: 0.9, ..Default::default() };
        let (stats, sel) = select(data, vec![n], &config);

        assert_eq!(sel.method, ClipMethod::ClipRejected);
        assert_eq!(sel.range, ClipRange::unclipped(&stats));
    }

    #[test]
    fn test_unclipped_when_saturation_low() {
        let config = RangeConfig { saturation_threshold: 1.0, ..Default::default() };
        let (stats, sel) = select(vec![-3.0, 1.0, 2.0, 5.0], vec![4], &config);
        assert_eq!(sel.method, ClipMethod::Unclipped);
        assert_eq!(sel.range, ClipRange::unclipped(&stats));
    }

    #[test]
    fn test_trial_saturation_counts_extremes() {
        // scale = 100/255, zero_point = -128: 0 -> -128 and 100 -> 127 both saturate
        let stats = CalibrationStatistics::from_data(&[0.0, 100.0]);
        assert_eq!(trial_saturation(&[0.0, 100.0], &stats), 1.0);
    }

    #[test]
    fn test_abs_max() {
        assert_eq!(ClipRange::new(-3.0, 2.0).abs_max(), 3.0);
        assert_eq!(ClipRange::new(0.0, 0.0).abs_max(), 0.0);
    }
}
