// src/processing/filters/mod.rs
//! Digital filters for EMG signal conditioning
//!
//! Coefficients are designed in `f64` transfer-function form and applied
//! forward-backward so that conditioned trials keep their timing.

pub mod coefficients;
pub mod filtfilt;
pub mod iir;

pub use coefficients::{ButterworthCoefficients, NotchCoefficients};
pub use filtfilt::ZeroPhaseFilter;
pub use iir::{lfilter, lfilter_zi};

use thiserror::Error;

/// Filter coefficients for IIR filters, normalised so that `a[0] == 1`
#[derive(Debug, Clone, PartialEq)]
pub struct IirCoefficients {
    pub b: Vec<f64>, // Numerator coefficients
    pub a: Vec<f64>, // Denominator coefficients
}

impl IirCoefficients {
    /// Build coefficients, normalising by `a[0]`
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Result<Self, FilterError> {
        let a0 = *a.first().ok_or_else(|| {
            FilterError::InvalidCoefficients("denominator must not be empty".to_string())
        })?;
        if b.is_empty() {
            return Err(FilterError::InvalidCoefficients("numerator must not be empty".to_string()));
        }
        if a0 == 0.0 || !a0.is_finite() {
            return Err(FilterError::InvalidCoefficients("a[0] must be finite and non-zero".to_string()));
        }
        if b.iter().chain(a.iter()).any(|c| !c.is_finite()) {
            return Err(FilterError::InvalidCoefficients("coefficients must be finite".to_string()));
        }

        Ok(Self {
            b: b.iter().map(|c| c / a0).collect(),
            a: a.iter().map(|c| c / a0).collect(),
        })
    }

    /// Number of taps of the longer polynomial
    pub fn len(&self) -> usize {
        self.a.len().max(self.b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Common filter error types
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Invalid coefficients: {0}")]
    InvalidCoefficients(String),
    #[error("Processing error: {0}")]
    ProcessingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficients_are_normalised() {
        let coeffs = IirCoefficients::new(vec![2.0, 4.0], vec![2.0, 1.0]).unwrap();
        assert_eq!(coeffs.b, vec![1.0, 2.0]);
        assert_eq!(coeffs.a, vec![1.0, 0.5]);
        assert_eq!(coeffs.len(), 2);
    }

    #[test]
    fn test_invalid_coefficients() {
        assert!(IirCoefficients::new(vec![1.0], vec![0.0, 1.0]).is_err());
        assert!(IirCoefficients::new(vec![], vec![1.0]).is_err());
        assert!(IirCoefficients::new(vec![f64::NAN], vec![1.0]).is_err());
    }
}
