//! Order statistics and moments shared by calibration, range selection and
//! the run summary.

/// Copy and sort `data` ascending. NaN sorts after every finite value and
/// +inf, so it never lands inside a low/high percentile of a mostly finite
/// tensor by accident.
pub fn sorted(data: &[f32]) -> Vec<f32> {
    let mut values = data.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Percentile `p` (in percent, `0..=100`) of an ascending slice, using
/// linear interpolation between the two closest ranks.
///
/// Returns NaN for an empty slice.
pub fn percentile(sorted: &[f32], p: f64) -> f32 {
    if sorted.is_empty() {
        return f32::NAN;
    }

    let p = p.clamp(0.0, 100.0);
    let position = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;

    let a = sorted[lo] as f64;
    let b = sorted[hi] as f64;
    if lo == hi {
        return a as f32;
    }
    (a + (b - a) * (position - lo as f64)) as f32
}

/// Median of an unsorted slice of `f64` values. NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Arithmetic mean accumulated in `f64`.
pub fn mean(data: &[f32]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().map(|&x| x as f64).sum::<f64>() / data.len() as f64
}

/// Population variance (divides by `n`) accumulated in `f64`.
pub fn variance(data: &[f32]) -> f64 {
    let m = mean(data);
    data.iter().map(|&x| (x as f64 - m).powi(2)).sum::<f64>() / data.len() as f64
}
