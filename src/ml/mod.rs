// src/ml/mod.rs
//! Classifiers and model-evaluation primitives
//!
//! Every model implements [`Classifier`]; the [`ClassifierProvider`] maps the
//! request vocabulary (`"SVC"`, `"Random Forest"`, ...) onto seeded, untrained
//! instances so that each cross-validation fold starts from a fresh model.

pub mod boosting;
pub mod cross_validation;
pub mod forest;
pub mod importance;
pub mod kmeans;
pub mod knn;
pub mod logistic;
pub mod metrics;
pub mod naive_bayes;
pub mod shap;
pub mod svm;
pub mod tree;

pub use cross_validation::{cross_val_predict, Fold, StratifiedKFold};
pub use metrics::{accuracy, confusion_matrix, f1_macro};

use crate::error::{Capability, EmgErrorBuilder, EmgResult};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::fmt;

/// Trainable multi-class model
pub trait Classifier: Send + Sync {
    /// Model family name as used in requests
    fn name(&self) -> &'static str;

    /// Fit on `(samples, features)` with class ids in `labels`
    fn fit(&mut self, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()>;

    /// Class probabilities, one column per entry of [`Classifier::classes`]
    fn predict_proba(&self, features: ArrayView2<f64>) -> EmgResult<Array2<f64>>;

    /// Sorted class ids seen during fitting
    fn classes(&self) -> &[usize];

    /// Most likely class per sample
    fn predict(&self, features: ArrayView2<f64>) -> EmgResult<Vec<usize>> {
        let proba = self.predict_proba(features)?;
        let classes = self.classes();
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| classes[argmax(row)])
            .collect())
    }

    fn n_classes(&self) -> usize {
        self.classes().len()
    }
}

/// Index of the first maximum
pub(crate) fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Sorted distinct labels and the label of each sample encoded as a column index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassIndex {
    classes: Vec<usize>,
}

impl ClassIndex {
    pub fn fit(labels: &[usize]) -> (Self, Vec<usize>) {
        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let encoded = labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or(0))
            .collect();
        (Self { classes }, encoded)
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Shared input checks for `fit`
pub(crate) fn check_training_data(model: &str, features: ArrayView2<f64>, labels: &[usize]) -> EmgResult<()> {
    if features.nrows() == 0 || features.ncols() == 0 {
        return Err(EmgErrorBuilder::new(model, "fit").capability(Capability::Classifier, "empty training set"));
    }
    if features.nrows() != labels.len() {
        return Err(EmgErrorBuilder::new(model, "fit").mismatch(
            "labels",
            "one label per training sample required",
            features.nrows(),
            labels.len(),
        ));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(EmgErrorBuilder::new(model, "fit").invalid_data("features", "non-finite feature value"));
    }
    Ok(())
}

/// Shared input checks for prediction
pub(crate) fn check_fitted(model: &str, fitted_features: Option<usize>, features: ArrayView2<f64>) -> EmgResult<()> {
    match fitted_features {
        None => Err(EmgErrorBuilder::new(model, "predict").capability(Capability::Classifier, "model used before fit")),
        Some(n) if n != features.ncols() => Err(EmgErrorBuilder::new(model, "predict").mismatch(
            "features",
            "feature count differs from training",
            n,
            features.ncols(),
        )),
        Some(_) => Ok(()),
    }
}

/// Supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    Svc,
    LogisticRegression,
    Knn,
    NaiveBayes,
    Xgb,
    RandomForest,
}

impl ClassifierKind {
    pub const ALL: [ClassifierKind; 6] = [
        ClassifierKind::Svc,
        ClassifierKind::LogisticRegression,
        ClassifierKind::Knn,
        ClassifierKind::NaiveBayes,
        ClassifierKind::Xgb,
        ClassifierKind::RandomForest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ClassifierKind::Svc => "SVC",
            ClassifierKind::LogisticRegression => "Logistic Regression",
            ClassifierKind::Knn => "KNN",
            ClassifierKind::NaiveBayes => "Naive Bayes",
            ClassifierKind::Xgb => "XGB",
            ClassifierKind::RandomForest => "Random Forest",
        }
    }

    /// Resolve a request token; an absent token selects the random forest
    pub fn from_name(name: Option<&str>) -> EmgResult<Self> {
        match name {
            None => Ok(ClassifierKind::RandomForest),
            Some(token) => Self::ALL.into_iter().find(|k| k.name() == token).ok_or_else(|| {
                EmgErrorBuilder::new("classifier_provider", "resolve")
                    .capability(Capability::Classifier, format!("unknown model '{}'", token))
            }),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Creates seeded, untrained classifiers
#[derive(Debug, Clone, Copy)]
pub struct ClassifierProvider {
    seed: u64,
}

impl ClassifierProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn create(&self, kind: ClassifierKind) -> Box<dyn Classifier> {
        match kind {
            ClassifierKind::Svc => Box::new(svm::SupportVectorClassifier::default()),
            ClassifierKind::LogisticRegression => Box::new(logistic::LogisticRegression::default()),
            ClassifierKind::Knn => Box::new(knn::KNearestNeighbors::default()),
            ClassifierKind::NaiveBayes => Box::new(naive_bayes::GaussianNaiveBayes::default()),
            ClassifierKind::Xgb => Box::new(boosting::GradientBoosting::default()),
            ClassifierKind::RandomForest => Box::new(forest::RandomForest::new(self.seed)),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Three well separated Gaussian blobs in `n_features` dimensions
    pub fn blobs(per_class: usize, n_features: usize, seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 3 * per_class;
        let mut labels = Vec::with_capacity(n);
        let features = Array2::from_shape_fn((n, n_features), |(i, j)| {
            let class = i / per_class;
            let centre = if j % 3 == class { 4.0 } else { 0.0 };
            centre + rng.gen_range(-1.0..1.0)
        });
        for i in 0..n {
            labels.push(i / per_class);
        }
        (features, labels)
    }
}
