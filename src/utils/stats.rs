//! Per-channel statistics and ordering helpers

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::Rng;

/// Arithmetic mean of a slice; zero for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Root-mean-square of a 1-D signal; zero for an empty signal
pub fn rms(signal: ArrayView1<f64>) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&x| x * x).sum::<f64>() / signal.len() as f64).sqrt()
}

/// Population standard deviation of a 1-D signal
pub fn std_dev(signal: ArrayView1<f64>) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let n = signal.len() as f64;
    let mu = signal.sum() / n;
    (signal.iter().map(|&x| (x - mu).powi(2)).sum::<f64>() / n).sqrt()
}

/// Standard normal draw via the Box-Muller transform
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps the logarithm finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Temporal mean of every channel of a `(samples, channels)` array
pub fn column_mean(data: ArrayView2<f64>) -> Array1<f64> {
    data.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()))
}

/// RMS of every channel of a `(samples, channels)` array
pub fn column_rms(data: ArrayView2<f64>) -> Array1<f64> {
    data.axis_iter(Axis(1)).map(rms).collect()
}

/// Average rectified value (mean of |x|) of every channel
pub fn column_arv(data: ArrayView2<f64>) -> Array1<f64> {
    if data.nrows() == 0 {
        return Array1::zeros(data.ncols());
    }
    let n = data.nrows() as f64;
    data.axis_iter(Axis(1))
        .map(|channel| channel.iter().map(|x| x.abs()).sum::<f64>() / n)
        .collect()
}

/// Indices that sort `values` ascending. Equal values keep their input order.
pub fn argsort_ascending(values: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    indices
}

/// Digamma function ψ(x) for x > 0
pub fn digamma(mut x: f64) -> f64 {
    let mut result = 0.0;
    // Recurrence ψ(x) = ψ(x + 1) - 1/x until the asymptotic series is accurate
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    result + x.ln() - 0.5 * inv
        - inv2 * (1.0 / 12.0 - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0 - inv2 / 132.0))))
}
