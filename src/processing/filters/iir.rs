// src/processing/filters/iir.rs
//! IIR (Infinite Impulse Response) digital filters

use super::{FilterError, IirCoefficients};
use crate::utils::solve_linear_system;
use ndarray::{Array1, Array2};

/// Stateful IIR filter in transposed Direct Form II
pub struct IirFilter {
    coefficients: IirCoefficients,
    state: Vec<f64>,
}

impl IirFilter {
    /// Create filter from coefficients
    pub fn new(coefficients: IirCoefficients) -> Self {
        let (b, a) = padded(&coefficients);
        Self {
            state: vec![0.0; b.len().saturating_sub(1)],
            coefficients: IirCoefficients { b, a },
        }
    }

    /// Create filter whose delay line starts from the given state
    pub fn with_state(coefficients: IirCoefficients, state: Vec<f64>) -> Result<Self, FilterError> {
        let mut filter = Self::new(coefficients);
        if state.len() != filter.state.len() {
            return Err(FilterError::InvalidParameters(format!(
                "Initial state must have {} elements, got {}",
                filter.state.len(),
                state.len()
            )));
        }
        filter.state = state;
        Ok(filter)
    }

    /// Process single sample
    pub fn process_sample(&mut self, input: f64) -> f64 {
        let b = &self.coefficients.b;
        let a = &self.coefficients.a;
        let n = self.state.len();

        let output = b[0] * input + self.state.first().copied().unwrap_or(0.0);

        for i in 0..n {
            let next = if i + 1 < n { self.state[i + 1] } else { 0.0 };
            self.state[i] = b[i + 1] * input - a[i + 1] * output + next;
        }

        output
    }

    /// Process a whole buffer
    pub fn process(&mut self, input: &[f64]) -> Vec<f64> {
        input.iter().map(|&x| self.process_sample(x)).collect()
    }
}

/// Filter `input` with the given coefficients, optionally from an initial state
pub fn lfilter(
    coefficients: &IirCoefficients,
    input: &[f64],
    initial_state: Option<&[f64]>,
) -> Result<Vec<f64>, FilterError> {
    let mut filter = match initial_state {
        Some(state) => IirFilter::with_state(coefficients.clone(), state.to_vec())?,
        None => IirFilter::new(coefficients.clone()),
    };
    Ok(filter.process(input))
}

/// Steady-state delay line of the filter for a unit step input
///
/// Scaled by the first input sample this removes the start-up transient.
pub fn lfilter_zi(coefficients: &IirCoefficients) -> Result<Vec<f64>, FilterError> {
    let (b, a) = padded(coefficients);
    let n = b.len();
    if n < 2 {
        return Ok(Vec::new());
    }
    let m = n - 1;

    // (I - A^T) zi = b[1:] - a[1:] * b[0], A being the companion matrix of a
    let mut system = Array2::<f64>::eye(m);
    for i in 0..m {
        system[[i, 0]] += a[i + 1];
        if i + 1 < m {
            system[[i, i + 1]] -= 1.0;
        }
    }
    let rhs: Array1<f64> = (0..m).map(|i| b[i + 1] - a[i + 1] * b[0]).collect();

    solve_linear_system(system.view(), rhs.view())
        .map(|zi| zi.to_vec())
        .ok_or_else(|| {
            FilterError::ProcessingError("singular system computing initial conditions".to_string())
        })
}

/// Both polynomials padded with zeros to a common length
fn padded(coefficients: &IirCoefficients) -> (Vec<f64>, Vec<f64>) {
    let n = coefficients.len();
    let mut b = coefficients.b.clone();
    let mut a = coefficients.a.clone();
    b.resize(n, 0.0);
    a.resize(n, 0.0);
    (b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::filters::ButterworthCoefficients;

    fn first_order_lowpass() -> IirCoefficients {
        IirCoefficients::new(vec![0.5, 0.5], vec![1.0, -0.2]).unwrap()
    }

    #[test]
    fn test_filter_processing() {
        let mut filter = IirFilter::new(first_order_lowpass());

        let output1 = filter.process_sample(1.0);
        let output2 = filter.process_sample(0.0);

        assert!((output1 - 0.5).abs() < 1e-12);
        // y1 = 0.5 * 0 + (0.5 * 1 + 0.2 * 0.5)
        assert!((output2 - 0.6).abs() < 1e-12);

        let mut restarted = IirFilter::with_state(first_order_lowpass(), vec![0.0]).unwrap();
        assert!((restarted.process_sample(1.0) - 0.5).abs() < 1e-12);
        assert!(IirFilter::with_state(first_order_lowpass(), vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn test_lfilter_matches_difference_equation() {
        let coeffs = ButterworthCoefficients::lowpass(2, 100.0, 1000.0).unwrap();
        let input: Vec<f64> = (0..50).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let output = lfilter(&coeffs, &input, None).unwrap();

        for n in 0..input.len() {
            let mut expected = 0.0;
            for (k, bk) in coeffs.b.iter().enumerate() {
                if n >= k {
                    expected += bk * input[n - k];
                }
            }
            for (k, ak) in coeffs.a.iter().enumerate().skip(1) {
                if n >= k {
                    expected -= ak * output[n - k];
                }
            }
            assert!((output[n] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_lfilter_zi_gives_steady_state_step() {
        let coeffs = ButterworthCoefficients::lowpass(3, 50.0, 1000.0).unwrap();
        let zi = lfilter_zi(&coeffs).unwrap();
        assert_eq!(zi.len(), 3);

        // Unity DC gain: a unit step started from zi stays at one
        let output = lfilter(&coeffs, &[1.0; 20], Some(&zi)).unwrap();
        for y in output {
            assert!((y - 1.0).abs() < 1e-9, "output {}", y);
        }
    }

    #[test]
    fn test_wrong_state_length_rejected() {
        assert!(lfilter(&first_order_lowpass(), &[1.0], Some(&[0.0, 0.0])).is_err());
    }
}
