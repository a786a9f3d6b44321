//! Fidelity of a reconstructed tensor against its original.

use serde::Serialize;

use crate::calibration::stats;

/// Error metrics for an INT8 candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FidelityMetrics {
    /// Mean squared error between original and dequantized values.
    pub mse: f64,
    /// `10·log10(var(original) / mse)`; `+inf` when `mse == 0` or when the
    /// original has zero variance (a constant tensor has no signal to lose).
    pub snr_db: f64,
    /// Cosine similarity of the flattened vectors.
    pub cosine_similarity: f64,
}

impl FidelityMetrics {
    pub fn compute(original: &[f32], reconstructed: &[f32]) -> Self {
        debug_assert_eq!(original.len(), reconstructed.len());

        let n = original.len().max(1) as f64;
        let mut sq_err = 0.0_f64;
        let mut dot = 0.0_f64;
        let mut norm_o = 0.0_f64;
        let mut norm_r = 0.0_f64;

        for (&o, &r) in original.iter().zip(reconstructed) {
            let (o, r) = (o as f64, r as f64);
            sq_err += (o - r).powi(2);
            dot += o * r;
            norm_o += o * o;
            norm_r += r * r;
        }

        let mse = sq_err / n;
        let variance = stats::variance(original);
        // A constant tensor can miss `127 * scale` by one ulp; that is not a
        // fidelity loss worth rejecting INT8 over.
        let snr_db = if mse == 0.0 || variance == 0.0 {
            f64::INFINITY
        } else {
            10.0 * (variance / mse).log10()
        };

        Self {
            mse,
            snr_db,
            cosine_similarity: cosine(dot, norm_o, norm_r),
        }
    }
}

fn cosine(dot: f64, norm_sq_a: f64, norm_sq_b: f64) -> f64 {
    match (norm_sq_a == 0.0, norm_sq_b == 0.0) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => dot / (norm_sq_a.sqrt() * norm_sq_b.sqrt()),
    }
}
