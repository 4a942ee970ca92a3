// src/processing/filters/filtfilt.rs
//! Forward-backward (zero-phase) filtering with odd-extension padding

use super::{lfilter, lfilter_zi, FilterError, IirCoefficients};
use crate::config::constants::conditioning::FILTFILT_PAD_FACTOR;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Zero-phase filter built from a single set of coefficients
#[derive(Debug, Clone)]
pub struct ZeroPhaseFilter {
    coefficients: IirCoefficients,
    zi: Vec<f64>,
}

impl ZeroPhaseFilter {
    pub fn new(coefficients: IirCoefficients) -> Result<Self, FilterError> {
        let zi = lfilter_zi(&coefficients)?;
        Ok(Self { coefficients, zi })
    }

    /// Samples mirrored onto each edge before filtering
    pub fn pad_length(&self) -> usize {
        FILTFILT_PAD_FACTOR * self.coefficients.a.len().max(self.coefficients.b.len())
    }

    /// Filter one channel forward then backward
    pub fn apply(&self, signal: ArrayView1<f64>) -> Result<Vec<f64>, FilterError> {
        let padlen = self.pad_length();
        let len = signal.len();
        if len <= padlen {
            return Err(FilterError::InvalidParameters(format!(
                "Signal length {} must exceed the padding length {}",
                len, padlen
            )));
        }

        let extended = odd_extension(signal, padlen);

        let forward_state: Vec<f64> = self.zi.iter().map(|z| z * extended[0]).collect();
        let mut forward = lfilter(&self.coefficients, &extended, Some(&forward_state))?;

        forward.reverse();
        let backward_state: Vec<f64> = self.zi.iter().map(|z| z * forward[0]).collect();
        let mut backward = lfilter(&self.coefficients, &forward, Some(&backward_state))?;
        backward.reverse();

        Ok(backward[padlen..padlen + len].to_vec())
    }

    /// Filter every column of a (samples, channels) matrix independently
    pub fn apply_columns(&self, data: ArrayView2<f64>) -> Result<Array2<f64>, FilterError> {
        let mut output = Array2::<f64>::zeros(data.raw_dim());
        for (column, mut target) in data.axis_iter(Axis(1)).zip(output.axis_iter_mut(Axis(1))) {
            let filtered = self.apply(column)?;
            for (dst, src) in target.iter_mut().zip(filtered) {
                *dst = src;
            }
        }
        Ok(output)
    }
}

/// Point-symmetric extension of both signal edges by `padlen` samples
fn odd_extension(signal: ArrayView1<f64>, padlen: usize) -> Vec<f64> {
    let len = signal.len();
    let first = signal[0];
    let last = signal[len - 1];

    let mut extended = Vec::with_capacity(len + 2 * padlen);
    extended.extend((1..=padlen).rev().map(|i| 2.0 * first - signal[i]));
    extended.extend(signal.iter().copied());
    extended.extend((1..=padlen).map(|i| 2.0 * last - signal[len - 1 - i]));
    extended
}
