//! Calibration: descriptive statistics of a tensor and the clipping range
//! derived from them.

use crate::tensor::Tensor;

pub mod range;
pub mod stats;

pub use range::{select_range, ClipMethod, ClipRange, RangeConfig, RangeSelection};

/// Snapshot of `{mean, std, min, max}` over every element of one tensor.
///
/// NaN and infinities propagate into the fields instead of failing; callers
/// check [`is_finite`](Self::is_finite) before trusting the values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStatistics {
    pub mean: f32,
    /// Population standard deviation.
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

impl CalibrationStatistics {
    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self::from_data(tensor.data())
    }

    pub fn from_data(data: &[f32]) -> Self {
        let min = data.iter().copied().fold(f32::INFINITY, nan_min);
        let max = data.iter().copied().fold(f32::NEG_INFINITY, nan_max);

        let mean = stats::mean(data);
        let std = stats::variance(data).sqrt();

        Self {
            mean: mean as f32,
            std: std as f32,
            min,
            max,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.mean.is_finite()
            && self.std.is_finite()
            && self.min.is_finite()
            && self.max.is_finite()
    }

    /// `max - min`; zero for a single-valued tensor.
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn has_zero_range(&self) -> bool {
        self.min == self.max
    }
}

// f32::min/max drop NaN operands; calibration must surface them instead.
fn nan_min(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.min(b)
    }
}

fn nan_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.max(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_tensor() {
        let t = Tensor::new(vec![2.0; 16], vec![4, 4]).unwrap();
        let s = CalibrationStatistics::from_tensor(&t);
        assert_eq!(s.mean, 2.0);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 2.0);
        assert!(s.has_zero_range());
    }

    #[test]
    fn test_basic_moments() {
        let s = CalibrationStatistics::from_data(&[-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(s.min, -1.0);
        assert_eq!(s.max, 1.0);
        assert!(s.mean.abs() < 1e-7);
        assert!((s.std - 0.5_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_nan_propagates() {
        let s = CalibrationStatistics::from_data(&[1.0, f32::NAN, 3.0]);
        assert!(s.mean.is_nan());
        assert!(s.min.is_nan());
        assert!(s.max.is_nan());
        assert!(!s.is_finite());
    }

    #[test]
    fn test_infinity_propagates() {
        let s = CalibrationStatistics::from_data(&[1.0, f32::INFINITY]);
        assert_eq!(s.max, f32::INFINITY);
        assert!(!s.is_finite());
    }
}
