// src/processing/filters/coefficients.rs
//! IIR coefficient design
//!
//! Butterworth filters are designed from the analog prototype in zero/pole/gain
//! form, frequency-transformed, mapped with the bilinear transform and expanded
//! to polynomials. The powerline notch uses the closed-form second-order design.

use super::{FilterError, IirCoefficients};
use crate::config::constants::conditioning::{MAX_FILTER_ORDER, MIN_FILTER_ORDER};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

/// Sampling rate of the normalised design domain (Nyquist = 1)
const DESIGN_FS: f64 = 2.0;

/// Butterworth filter coefficient calculator
pub struct ButterworthCoefficients;

/// Zeros, poles and gain of a transfer function
#[derive(Debug, Clone)]
struct Zpk {
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
}

impl ButterworthCoefficients {
    /// Low-pass design, used to exercise the filtering primitives in tests
    #[cfg(test)]
    pub(crate) fn lowpass(order: usize, cutoff: f64, sample_rate: f64) -> Result<IirCoefficients, FilterError> {
        check_order(order)?;
        let wn = normalized_frequency(cutoff, sample_rate)?;
        let warped = prewarp(wn);

        let prototype = Self::analog_prototype(order);
        let zpk = Zpk {
            zeros: Vec::new(),
            poles: prototype.poles.iter().map(|p| p * warped).collect(),
            gain: prototype.gain * warped.powi(order as i32),
        };
        zpk_to_coefficients(bilinear(zpk))
    }

    /// Band-pass design used by the signal conditioner
    pub fn bandpass(order: usize, low_cutoff: f64, high_cutoff: f64, sample_rate: f64) -> Result<IirCoefficients, FilterError> {
        check_order(order)?;
        if low_cutoff >= high_cutoff {
            return Err(FilterError::InvalidParameters(
                "Low cutoff must be less than high cutoff".to_string(),
            ));
        }
        let low = prewarp(normalized_frequency(low_cutoff, sample_rate)?);
        let high = prewarp(normalized_frequency(high_cutoff, sample_rate)?);

        let bandwidth = high - low;
        let center = (low * high).sqrt();

        let prototype = Self::analog_prototype(order);

        // lp -> bp: every pole splits into a pair around the centre frequency
        let mut poles = Vec::with_capacity(2 * order);
        for p in &prototype.poles {
            let scaled = p * (bandwidth / 2.0);
            let offset = (scaled * scaled - center * center).sqrt();
            poles.push(scaled + offset);
            poles.push(scaled - offset);
        }

        let zpk = Zpk {
            zeros: vec![Complex64::new(0.0, 0.0); order],
            poles,
            gain: prototype.gain * bandwidth.powi(order as i32),
        };
        zpk_to_coefficients(bilinear(zpk))
    }

    /// Normalised analog Butterworth prototype (cutoff 1 rad/s)
    fn analog_prototype(order: usize) -> Zpk {
        let n = order as f64;
        let poles = (0..order)
            .map(|k| {
                let m = -(n - 1.0) + 2.0 * k as f64;
                -Complex64::from_polar(1.0, PI * m / (2.0 * n))
            })
            .collect();
        Zpk { zeros: Vec::new(), poles, gain: 1.0 }
    }
}

/// Second-order IIR notch for powerline interference removal
pub struct NotchCoefficients;

impl NotchCoefficients {
    /// Design a notch at `notch_freq` with quality factor `q`
    pub fn design(notch_freq: f64, q: f64, sample_rate: f64) -> Result<IirCoefficients, FilterError> {
        if q <= 0.0 {
            return Err(FilterError::InvalidParameters(format!(
                "Quality factor must be positive, got {}",
                q
            )));
        }
        let w0 = normalized_frequency(notch_freq, sample_rate)?;

        let bandwidth = w0 / q * PI;
        let w0 = w0 * PI;

        // -3 dB attenuation at the band edges
        let beta = (bandwidth / 2.0).tan();
        let gain = 1.0 / (1.0 + beta);
        let cos_w0 = w0.cos();

        IirCoefficients::new(
            vec![gain, -2.0 * gain * cos_w0, gain],
            vec![1.0, -2.0 * gain * cos_w0, 2.0 * gain - 1.0],
        )
    }
}

fn check_order(order: usize) -> Result<(), FilterError> {
    if !(MIN_FILTER_ORDER..=MAX_FILTER_ORDER).contains(&order) {
        return Err(FilterError::InvalidParameters(format!(
            "Order must be {}-{}",
            MIN_FILTER_ORDER, MAX_FILTER_ORDER
        )));
    }
    Ok(())
}

/// Cutoff as a fraction of the Nyquist frequency, strictly inside (0, 1)
fn normalized_frequency(cutoff: f64, sample_rate: f64) -> Result<f64, FilterError> {
    if sample_rate <= 0.0 || !sample_rate.is_finite() {
        return Err(FilterError::InvalidParameters(format!(
            "Sampling rate must be positive, got {}",
            sample_rate
        )));
    }
    let nyquist = sample_rate / 2.0;
    let normalized = cutoff / nyquist;
    if normalized <= 0.0 || normalized >= 1.0 || !normalized.is_finite() {
        return Err(FilterError::InvalidParameters(format!(
            "Invalid cutoff frequency: {} Hz (Nyquist: {} Hz)",
            cutoff, nyquist
        )));
    }
    Ok(normalized)
}

/// Pre-warp a normalised digital frequency for the bilinear transform
fn prewarp(normalized: f64) -> f64 {
    2.0 * DESIGN_FS * (PI * normalized / DESIGN_FS).tan()
}

fn bilinear(zpk: Zpk) -> Zpk {
    let fs2 = Complex64::new(2.0 * DESIGN_FS, 0.0);
    let degree = zpk.poles.len() - zpk.zeros.len();

    let mut zeros: Vec<Complex64> = zpk.zeros.iter().map(|z| (fs2 + z) / (fs2 - z)).collect();
    let poles: Vec<Complex64> = zpk.poles.iter().map(|p| (fs2 + p) / (fs2 - p)).collect();
    // Zeros at infinity map to Nyquist
    zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));

    let num: Complex64 = zpk.zeros.iter().map(|z| fs2 - z).product();
    let den: Complex64 = zpk.poles.iter().map(|p| fs2 - p).product();

    Zpk {
        zeros,
        poles,
        gain: zpk.gain * (num / den).re,
    }
}

/// Expand roots into monic polynomial coefficients, highest power first
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs
}

fn zpk_to_coefficients(zpk: Zpk) -> Result<IirCoefficients, FilterError> {
    let b: Vec<f64> = poly(&zpk.zeros).iter().map(|c| c.re * zpk.gain).collect();
    let a: Vec<f64> = poly(&zpk.poles).iter().map(|c| c.re).collect();
    IirCoefficients::new(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Magnitude response |H(e^{jw})| at `freq` Hz
    fn magnitude(coeffs: &IirCoefficients, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let eval = |c: &[f64]| -> Complex64 {
            c.iter()
                .enumerate()
                .map(|(k, &ck)| ck * Complex64::from_polar(1.0, -w * k as f64))
                .sum()
        };
        (eval(&coeffs.b) / eval(&coeffs.a)).norm()
    }

    #[test]
    fn test_bandpass_length_and_passband() {
        let coeffs = ButterworthCoefficients::bandpass(4, 20.0, 450.0, 2000.0).unwrap();
        assert_eq!(coeffs.b.len(), 9);
        assert_eq!(coeffs.a.len(), 9);

        let centre = magnitude(&coeffs, (20.0f64 * 450.0).sqrt(), 2000.0);
        assert!((centre - 1.0).abs() < 1e-3, "centre gain {}", centre);

        let low_edge = magnitude(&coeffs, 20.0, 2000.0);
        let high_edge = magnitude(&coeffs, 450.0, 2000.0);
        assert!((low_edge - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert!((high_edge - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);

        assert!(magnitude(&coeffs, 1.0, 2000.0) < 1e-3);
        assert!(magnitude(&coeffs, 950.0, 2000.0) < 1e-2);
    }

    #[test]
    fn test_lowpass_edges() {
        let lp = ButterworthCoefficients::lowpass(2, 100.0, 1000.0).unwrap();
        assert!((magnitude(&lp, 0.0, 1000.0) - 1.0).abs() < 1e-9);
        assert!((magnitude(&lp, 100.0, 1000.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_notch_response() {
        let coeffs = NotchCoefficients::design(50.0, 50.0, 2000.0).unwrap();
        assert_eq!(coeffs.b.len(), 3);
        assert!(magnitude(&coeffs, 50.0, 2000.0) < 1e-9);
        assert!((magnitude(&coeffs, 150.0, 2000.0) - 1.0).abs() < 1e-2);
        assert!((magnitude(&coeffs, 0.0, 2000.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(ButterworthCoefficients::bandpass(0, 20.0, 450.0, 2000.0).is_err());
        assert!(ButterworthCoefficients::bandpass(4, 450.0, 20.0, 2000.0).is_err());
        assert!(ButterworthCoefficients::bandpass(4, 20.0, 1000.0, 2000.0).is_err());
        assert!(ButterworthCoefficients::bandpass(4, 20.0, 450.0, 0.0).is_err());
        assert!(NotchCoefficients::design(50.0, 0.0, 2000.0).is_err());
        assert!(NotchCoefficients::design(1500.0, 50.0, 2000.0).is_err());
    }
}
