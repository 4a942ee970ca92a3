// src/ml/metrics.rs
//! Classification metrics

use ndarray::Array2;

/// Fraction of matching predictions
pub fn accuracy(truth: &[usize], predicted: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// Unweighted mean of per-class F1 over every class occurring in either vector
pub fn f1_macro(truth: &[usize], predicted: &[usize]) -> f64 {
    let mut labels: Vec<usize> = truth.iter().chain(predicted).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    if labels.is_empty() {
        return 0.0;
    }

    let total: f64 = labels
        .iter()
        .map(|&label| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fn_ = 0usize;
            for (&t, &p) in truth.iter().zip(predicted) {
                match (t == label, p == label) {
                    (true, true) => tp += 1,
                    (false, true) => fp += 1,
                    (true, false) => fn_ += 1,
                    (false, false) => {}
                }
            }
            let denominator = 2 * tp + fp + fn_;
            if denominator == 0 {
                0.0
            } else {
                2.0 * tp as f64 / denominator as f64
            }
        })
        .sum();

    total / labels.len() as f64
}

/// `n_classes x n_classes` counts, rows = true class, columns = predicted class
pub fn confusion_matrix(truth: &[usize], predicted: &[usize], n_classes: usize) -> Array2<usize> {
    let mut matrix = Array2::<usize>::zeros((n_classes, n_classes));
    for (&t, &p) in truth.iter().zip(predicted) {
        if t < n_classes && p < n_classes {
            matrix[[t, p]] += 1;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 2, 2], &[0, 1, 1, 2]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_f1_macro_hand_computed() {
        // class 0: tp 1 fp 0 fn 1 -> 2/3; class 1: tp 1 fp 1 fn 0 -> 2/3; class 2: tp 1 -> 1
        let truth = [0, 0, 1, 2];
        let predicted = [0, 1, 1, 2];
        let expected = (2.0 / 3.0 + 2.0 / 3.0 + 1.0) / 3.0;
        assert!((f1_macro(&truth, &predicted) - expected).abs() < 1e-12);
        assert_eq!(f1_macro(&[1, 1], &[1, 1]), 1.0);
    }

    #[test]
    fn test_confusion_matrix_rows_are_truth() {
        let cm = confusion_matrix(&[0, 0, 1, 2], &[0, 1, 1, 0], 3);
        assert_eq!(cm, array![[1, 1, 0], [0, 1, 0], [1, 0, 0]]);
        assert_eq!(cm.row(0).sum(), 2);
    }
}
