// src/processing/conditioner.rs
//! Powerline notch and band-pass conditioning of recorded trials

use crate::config::ConditioningConfig;
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::processing::filters::{ButterworthCoefficients, NotchCoefficients, ZeroPhaseFilter};
use ndarray::{Array2, ArrayView2};
use tracing::debug;

/// Zero-phase notch + band-pass conditioner
///
/// Both stages are applied forward-backward to every channel independently, so
/// the conditioned trial has the same `(samples, channels)` shape and no phase
/// shift relative to the raw recording.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditioningConfig,
}

/// Filters designed for one sampling rate
#[derive(Debug, Clone)]
pub struct ConditioningFilters {
    notch: ZeroPhaseFilter,
    bandpass: ZeroPhaseFilter,
}

impl ConditioningFilters {
    /// Minimum trial length both filters accept
    pub fn min_samples(&self) -> usize {
        self.notch.pad_length().max(self.bandpass.pad_length()) + 1
    }

    pub fn apply(&self, trial: ArrayView2<f64>) -> EmgResult<Array2<f64>> {
        let samples = trial.nrows();
        if samples < self.min_samples() {
            return Err(EmgErrorBuilder::new("signal_conditioner", "condition").mismatch(
                "trial",
                "too short for zero-phase filtering",
                format!(">= {} samples", self.min_samples()),
                samples,
            ));
        }

        let notched = self.notch.apply_columns(trial)?;
        Ok(self.bandpass.apply_columns(notched.view())?)
    }
}

impl SignalConditioner {
    pub fn new(config: ConditioningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.config
    }

    /// Design the notch and band-pass filters for `sampling_rate` Hz
    pub fn design(&self, sampling_rate: f64) -> EmgResult<ConditioningFilters> {
        if sampling_rate <= 0.0 || !sampling_rate.is_finite() {
            return Err(EmgErrorBuilder::new("signal_conditioner", "design")
                .configuration(format!("sampling rate must be positive, got {}", sampling_rate)));
        }

        let nyquist = sampling_rate / 2.0;
        let c = &self.config;
        if c.powerline_hz <= 0.0 || c.powerline_hz >= nyquist {
            return Err(EmgErrorBuilder::new("signal_conditioner", "design").configuration(format!(
                "notch frequency {} Hz outside (0, {}) Hz",
                c.powerline_hz, nyquist
            )));
        }
        if !(0.0 < c.bandpass_low_hz && c.bandpass_low_hz < c.bandpass_high_hz && c.bandpass_high_hz < nyquist) {
            return Err(EmgErrorBuilder::new("signal_conditioner", "design").configuration(format!(
                "passband {}-{} Hz must satisfy 0 < low < high < {} Hz",
                c.bandpass_low_hz, c.bandpass_high_hz, nyquist
            )));
        }

        let notch = NotchCoefficients::design(c.powerline_hz, c.notch_q, sampling_rate)?;
        let bandpass = ButterworthCoefficients::bandpass(
            c.bandpass_order,
            c.bandpass_low_hz,
            c.bandpass_high_hz,
            sampling_rate,
        )?;

        debug!(
            sampling_rate,
            notch_hz = c.powerline_hz,
            low_hz = c.bandpass_low_hz,
            high_hz = c.bandpass_high_hz,
            "designed conditioning filters"
        );

        Ok(ConditioningFilters {
            notch: ZeroPhaseFilter::new(notch)?,
            bandpass: ZeroPhaseFilter::new(bandpass)?,
        })
    }

    /// Condition a single `(samples, channels)` trial
    pub fn condition(&self, trial: ArrayView2<f64>, sampling_rate: f64) -> EmgResult<Array2<f64>> {
        self.design(sampling_rate)?.apply(trial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmgError;
    use std::f64::consts::PI;

    fn sine_trial(samples: usize, channels: usize, freq: f64, fs: f64) -> Array2<f64> {
        Array2::from_shape_fn((samples, channels), |(i, c)| {
            (c + 1) as f64 * (2.0 * PI * freq * i as f64 / fs).sin()
        })
    }

    fn rms(values: impl Iterator<Item = f64>) -> f64 {
        let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
        (sum / n as f64).sqrt()
    }

    #[test]
    fn test_condition_preserves_shape() {
        let conditioner = SignalConditioner::new(ConditioningConfig::default());
        let trial = sine_trial(1000, 4, 100.0, 2000.0);
        let conditioned = conditioner.condition(trial.view(), 2000.0).unwrap();
        assert_eq!(conditioned.dim(), (1000, 4));
    }

    #[test]
    fn test_passband_tone_survives() {
        let conditioner = SignalConditioner::new(ConditioningConfig::default());
        let trial = sine_trial(8000, 1, 120.0, 2000.0);
        let conditioned = conditioner.condition(trial.view(), 2000.0).unwrap();

        // Ignore the start-up transients at both edges
        let core_in = rms(trial.column(0).iter().skip(3000).take(2000).copied());
        let core_out = rms(conditioned.column(0).iter().skip(3000).take(2000).copied());
        assert!((core_out / core_in - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_powerline_removed() {
        let conditioner = SignalConditioner::new(ConditioningConfig::default());
        let trial = sine_trial(8000, 1, 50.0, 2000.0);
        let conditioned = conditioner.condition(trial.view(), 2000.0).unwrap();
        let core_out = rms(conditioned.column(0).iter().skip(3000).take(2000).copied());
        assert!(core_out < 0.05, "residual {}", core_out);
    }

    #[test]
    fn test_invalid_sampling_rate() {
        let conditioner = SignalConditioner::new(ConditioningConfig::default());
        let trial = sine_trial(1000, 1, 100.0, 2000.0);
        let err = conditioner.condition(trial.view(), 0.0).unwrap_err();
        assert!(err.is_configuration());

        // 450 Hz band edge above the Nyquist frequency of 800 Hz sampling
        let err = conditioner.condition(trial.view(), 800.0).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_short_trial_is_data_error() {
        let conditioner = SignalConditioner::new(ConditioningConfig::default());
        let trial = sine_trial(20, 2, 100.0, 2000.0);
        let err = conditioner.condition(trial.view(), 2000.0).unwrap_err();
        assert!(matches!(err, EmgError::InvalidData { .. }));
    }
}
