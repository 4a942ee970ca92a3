// Spectral checks of the signal conditioner

use emg_channel_select::config::ConditioningConfig;
use emg_channel_select::processing::SignalConditioner;
use ndarray::{Array1, Array2, ArrayView1};
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

const FS: f64 = 2000.0;
const N: usize = 8000;

fn tone(freq: f64, amplitude: f64) -> Array1<f64> {
    Array1::from_shape_fn(N, |i| amplitude * (2.0 * PI * freq * i as f64 / FS).sin())
}

/// Magnitude of the FFT bin at `freq` over the central half of the signal
fn magnitude_at(signal: ArrayView1<f64>, freq: f64) -> f64 {
    let core: Vec<f64> = signal.iter().skip(N / 4).take(N / 2).copied().collect();
    let len = core.len();
    let mut buffer: Vec<Complex64> = core.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    FftPlanner::new().plan_fft_forward(len).process(&mut buffer);

    let bin = (freq * len as f64 / FS).round() as usize;
    buffer[bin].norm() / len as f64
}

fn db(ratio: f64) -> f64 {
    20.0 * ratio.log10()
}

fn condition(signal: &Array1<f64>) -> Array1<f64> {
    let trial: Array2<f64> = signal.clone().insert_axis(ndarray::Axis(1));
    let out = SignalConditioner::new(ConditioningConfig::default())
        .condition(trial.view(), FS)
        .unwrap();
    assert_eq!(out.dim(), (N, 1));
    out.column(0).to_owned()
}

#[test]
fn test_notch_removes_powerline_and_keeps_neighbours() {
    let raw = tone(50.0, 1.0) + tone(120.0, 1.0);
    let clean = condition(&raw);

    let powerline = db(magnitude_at(clean.view(), 50.0) / magnitude_at(raw.view(), 50.0));
    let emg_band = db(magnitude_at(clean.view(), 120.0) / magnitude_at(raw.view(), 120.0));

    assert!(powerline < -30.0, "50 Hz attenuated by only {:.1} dB", powerline);
    assert!(emg_band.abs() < 1.0, "120 Hz changed by {:.1} dB", emg_band);
}

#[test]
fn test_bandpass_rejects_out_of_band_components() {
    let raw = tone(5.0, 1.0) + tone(200.0, 1.0) + tone(800.0, 1.0) + 2.0;
    let clean = condition(&raw);

    let low = db(magnitude_at(clean.view(), 5.0) / magnitude_at(raw.view(), 5.0));
    let high = db(magnitude_at(clean.view(), 800.0) / magnitude_at(raw.view(), 800.0));
    let pass = db(magnitude_at(clean.view(), 200.0) / magnitude_at(raw.view(), 200.0));

    assert!(low < -40.0, "5 Hz attenuated by only {:.1} dB", low);
    assert!(high < -40.0, "800 Hz attenuated by only {:.1} dB", high);
    assert!(pass.abs() < 0.5, "200 Hz changed by {:.1} dB", pass);

    let dc = clean.iter().skip(N / 4).take(N / 2).sum::<f64>() / (N / 2) as f64;
    assert!(dc.abs() < 1e-3, "residual DC {}", dc);
}

#[test]
fn test_invalid_rates_are_configuration_errors() {
    let conditioner = SignalConditioner::new(ConditioningConfig::default());
    let trial = Array2::<f64>::zeros((N, 2));
    for fs in [0.0, -1.0, 600.0] {
        let err = conditioner.condition(trial.view(), fs).unwrap_err();
        assert!(err.is_configuration(), "fs {}: {}", fs, err);
    }
}

#[test]
fn test_short_trials_are_data_errors() {
    let conditioner = SignalConditioner::new(ConditioningConfig::default());
    let trial = Array2::<f64>::zeros((20, 2));
    let err = conditioner.condition(trial.view(), FS).unwrap_err();
    assert!(!err.is_configuration());
}
