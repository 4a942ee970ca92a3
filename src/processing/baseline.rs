// src/processing/baseline.rs
//! Rest-class reference statistics

use crate::error::{EmgErrorBuilder, EmgResult};
use crate::utils::{column_arv, column_mean, column_rms};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Per-channel mean and average rectified value of the rest class
#[derive(Debug, Clone, PartialEq)]
pub struct RestBaseline {
    pub mean: Array1<f64>,
    pub arv: Array1<f64>,
}

impl RestBaseline {
    pub fn n_channels(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / (arv + epsilon)` applied channel-wise
    pub fn normalize(&self, trial: ArrayView2<f64>, epsilon: f64) -> EmgResult<Array2<f64>> {
        if trial.ncols() != self.n_channels() {
            return Err(EmgErrorBuilder::new("rest_baseline", "normalize").mismatch(
                "trial",
                "channel count differs from the rest baseline",
                self.n_channels(),
                trial.ncols(),
            ));
        }
        let scale = self.arv.mapv(|a| a + epsilon);
        Ok((&trial - &self.mean) / &scale)
    }
}

/// Average the per-trial channel mean and ARV over every rest trial
pub fn aggregate_rest(rest_trials: &[Array2<f64>]) -> EmgResult<RestBaseline> {
    let n_channels = check_rest_trials(rest_trials, "aggregate_rest")?;

    let mut mean = Array1::<f64>::zeros(n_channels);
    let mut arv = Array1::<f64>::zeros(n_channels);
    for trial in rest_trials {
        mean += &column_mean(trial.view());
        arv += &column_arv(trial.view());
    }

    let count = rest_trials.len() as f64;
    Ok(RestBaseline {
        mean: mean / count,
        arv: arv / count,
    })
}

/// Average per-channel RMS of the rest trials
///
/// Each trial contributes its whole-length RMS, independent of any window size.
pub fn rest_rms_profile(rest_trials: &[Array2<f64>]) -> EmgResult<Array1<f64>> {
    let n_channels = check_rest_trials(rest_trials, "rest_rms_profile")?;

    let mut profiles = Array2::<f64>::zeros((rest_trials.len(), n_channels));
    for (mut row, trial) in profiles.axis_iter_mut(Axis(0)).zip(rest_trials) {
        row.assign(&column_rms(trial.view()));
    }

    profiles.mean_axis(Axis(0)).ok_or_else(|| {
        EmgErrorBuilder::new("rest_baseline", "rest_rms_profile").invalid_data("rest class", "no rest trials")
    })
}

fn check_rest_trials(rest_trials: &[Array2<f64>], operation: &str) -> EmgResult<usize> {
    let first = rest_trials.first().ok_or_else(|| {
        EmgErrorBuilder::new("rest_baseline", operation).invalid_data("rest class", "no rest trials")
    })?;

    let n_channels = first.ncols();
    for trial in rest_trials {
        if trial.ncols() != n_channels {
            return Err(EmgErrorBuilder::new("rest_baseline", operation).mismatch(
                "rest trial",
                "channel counts differ between rest trials",
                n_channels,
                trial.ncols(),
            ));
        }
        if trial.nrows() == 0 {
            return Err(EmgErrorBuilder::new("rest_baseline", operation)
                .invalid_data("rest trial", "trial holds no samples"));
        }
    }
    Ok(n_channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_aggregate_rest_averages_trials() {
        let rest = vec![
            array![[1.0, -2.0], [3.0, 2.0]],
            array![[-1.0, 4.0], [-1.0, 4.0]],
        ];
        let baseline = aggregate_rest(&rest).unwrap();
        // Means: [2, 0] and [-1, 4]
        assert_eq!(baseline.mean, array![0.5, 2.0]);
        // ARVs: [2, 2] and [1, 4]
        assert_eq!(baseline.arv, array![1.5, 3.0]);
    }

    #[test]
    fn test_normalize() {
        let baseline = RestBaseline {
            mean: array![1.0, 0.0],
            arv: array![2.0, 0.0],
        };
        let normalized = baseline.normalize(array![[3.0, 1e-8]].view(), 1e-8).unwrap();
        assert!((normalized[[0, 0]] - 1.0).abs() < 1e-6);
        assert!((normalized[[0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rest_rms_profile() {
        let rest = vec![array![[3.0], [4.0]], array![[1.0], [1.0]]];
        let profile = rest_rms_profile(&rest).unwrap();
        let expected = ((12.5f64).sqrt() + 1.0) / 2.0;
        assert!((profile[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rest_errors() {
        assert!(aggregate_rest(&[]).is_err());
        let mismatched = vec![Array2::<f64>::zeros((4, 2)), Array2::<f64>::zeros((4, 3))];
        assert!(aggregate_rest(&mismatched).is_err());
        assert!(rest_rms_profile(&mismatched).is_err());
    }
}
