//! Dense linear algebra for the small systems solved inside the pipeline
//!
//! Systems here are at most a few hundred unknowns (filter state vectors,
//! Kernel SHAP regressions), so Gaussian elimination with partial pivoting is
//! sufficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

const PIVOT_EPSILON: f64 = 1e-12;

/// Solve `a · x = b`. Returns `None` when the matrix is singular.
pub fn solve_linear_system(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    let mut m: Array2<f64> = a.to_owned();
    let mut rhs: Array1<f64> = b.to_owned();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))?;
        if m[[pivot_row, col]].abs() < PIVOT_EPSILON {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([col, k], [pivot_row, k]);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = m[[col, col]];
        for row in (col + 1)..n {
            let factor = m[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = rhs[row];
        for k in (row + 1)..n {
            acc -= m[[row, k]] * x[k];
        }
        x[row] = acc / m[[row, row]];
    }
    Some(x)
}

/// Weighted least squares: minimise `Σ w_i (y_i - x_i·β)²`.
///
/// A tiny ridge term keeps rank-deficient designs solvable.
pub fn weighted_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
) -> Option<Array1<f64>> {
    let p = x.ncols();
    let mut xtwx = Array2::<f64>::zeros((p, p));
    let mut xtwy = Array1::<f64>::zeros(p);

    for (i, row) in x.outer_iter().enumerate() {
        let w = weights[i];
        for a in 0..p {
            let wa = w * row[a];
            if wa == 0.0 {
                continue;
            }
            xtwy[a] += wa * y[i];
            for b in 0..p {
                xtwx[[a, b]] += wa * row[b];
            }
        }
    }

    let ridge = 1e-10 * (0..p).map(|i| xtwx[[i, i]]).fold(1.0, f64::max);
    for i in 0..p {
        xtwx[[i, i]] += ridge;
    }

    solve_linear_system(xtwx.view(), xtwy.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_solve_requires_pivoting() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];
        let x = solve_linear_system(a.view(), b.view()).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];
        assert!(solve_linear_system(a.view(), b.view()).is_none());
    }

    #[test]
    fn test_weighted_least_squares_recovers_line() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let w = array![1.0, 2.0, 1.0, 0.5];
        let beta = weighted_least_squares(x.view(), y.view(), w.view()).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-6);
        assert!((beta[1] - 2.0).abs() < 1e-6);
    }
}
