//! Common numerical utilities shared by the pipeline stages
//!
//! - Per-channel statistics over `(samples, channels)` arrays (mean, RMS, ARV)
//! - Stable argsort used by every ranking strategy
//! - Small dense linear solver used by filter initialisation and Kernel SHAP
//! - Special functions needed by the mutual information estimator

pub mod linalg;
pub mod stats;

pub use linalg::{solve_linear_system, weighted_least_squares};
pub use stats::{
    argsort_ascending, column_arv, column_mean, column_rms, digamma, mean, rms, standard_normal,
    std_dev,
};
