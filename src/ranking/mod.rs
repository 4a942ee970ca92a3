// src/ranking/mod.rs
//! Channel ranking strategies
//!
//! Every strategy orders the channels of a [`GestureSet`] from least to most
//! important. The four strategies differ in what "important" means:
//!
//! - [`EnergyRatioRanker`]: consensus of per-class energy orderings after rest
//!   baseline normalisation
//! - [`MutualInformationRanker`]: k-NN mutual information of each feature with the class
//! - [`PermutationRanker`]: cross-validated permutation importance of a classifier
//! - [`ShapRanker`]: cross-validated mean absolute Kernel SHAP attribution

pub mod energy_ratio;
pub mod mutual_information;
pub mod permutation;
pub mod shap;

pub use energy_ratio::EnergyRatioRanker;
pub use mutual_information::MutualInformationRanker;
pub use permutation::PermutationRanker;
pub use shap::ShapRanker;

use crate::config::PipelineConfig;
use crate::dataset::{ChannelSelection, GestureSet};
use crate::error::{Capability, EmgErrorBuilder, EmgResult};
use crate::ml::cross_validation::take_rows;
use crate::ml::{Classifier, ClassifierKind, ClassifierProvider, StratifiedKFold};
use crate::processing::FeatureExtractor;
use crate::utils::argsort_ascending;
use ndarray::ArrayView2;
use std::fmt;
use tracing::debug;

/// Channel indices ordered from least to most important
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RankedChannels(Vec<usize>);

impl RankedChannels {
    pub fn new(order: Vec<usize>) -> Self {
        Self(order)
    }

    /// Stable ascending order of per-channel scores
    pub fn from_scores(scores: &[f64]) -> Self {
        Self(argsort_ascending(scores))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }

    /// The `z` most important channels (the last `z` entries)
    pub fn top(&self, z: usize) -> &[usize] {
        &self.0[self.0.len().saturating_sub(z)..]
    }

    /// Keep only the `n` most important channels, preserving order
    pub fn truncate_to_top(&mut self, n: usize) {
        let drop = self.0.len().saturating_sub(n);
        self.0.drain(..drop);
    }

    /// Whether the ranking holds each of `0..n_channels` exactly once
    pub fn is_permutation_of(&self, n_channels: usize) -> bool {
        let mut sorted = self.0.clone();
        sorted.sort_unstable();
        sorted == (0..n_channels).collect::<Vec<_>>()
    }
}

impl fmt::Display for RankedChannels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Orders channels by estimated discriminative value
pub trait ChannelRanker: Send + Sync {
    fn name(&self) -> &'static str;

    fn rank(&self, gestures: &GestureSet) -> EmgResult<RankedChannels>;
}

/// Ranking strategy names accepted in requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingMetric {
    Rms,
    MutualInformation,
    Shap,
    PermutationImportance,
}

impl RankingMetric {
    pub const ALL: [RankingMetric; 4] = [
        RankingMetric::Rms,
        RankingMetric::MutualInformation,
        RankingMetric::Shap,
        RankingMetric::PermutationImportance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RankingMetric::Rms => "RMS",
            RankingMetric::MutualInformation => "Mutual Information",
            RankingMetric::Shap => "SHAP",
            RankingMetric::PermutationImportance => "Permutation Importance",
        }
    }

    /// Resolve a request token; an absent token selects mutual information
    pub fn from_name(name: Option<&str>) -> EmgResult<Self> {
        match name {
            None => Ok(RankingMetric::MutualInformation),
            Some(token) => Self::ALL.into_iter().find(|m| m.name() == token).ok_or_else(|| {
                EmgErrorBuilder::new("ranking", "resolve")
                    .capability(Capability::Importance, format!("unknown metric '{}'", token))
            }),
        }
    }

    /// Build the ranker for this metric
    ///
    /// `classifier` is only consulted by the model-based strategies.
    pub fn ranker(&self, config: &PipelineConfig, classifier: ClassifierKind) -> Box<dyn ChannelRanker> {
        match self {
            RankingMetric::Rms => Box::new(EnergyRatioRanker::new(config.ranking.normalization_epsilon)),
            RankingMetric::MutualInformation => Box::new(MutualInformationRanker::from_config(config)),
            RankingMetric::Shap => Box::new(ShapRanker::from_config(config, classifier)),
            RankingMetric::PermutationImportance => {
                Box::new(PermutationRanker::from_config(config, classifier))
            }
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cross-validation scaffold shared by the model-based rankers
///
/// Builds the full-channel feature matrix, fits a fresh model per fold and asks
/// `score` for one value per feature on the held-out part. The per-feature
/// scores are averaged over folds and summed per channel.
#[derive(Debug, Clone)]
pub(crate) struct FoldedImportance {
    pub extractor: FeatureExtractor,
    pub folds: StratifiedKFold,
    pub provider: ClassifierProvider,
    pub classifier: ClassifierKind,
}

impl FoldedImportance {
    pub fn channel_scores<F>(&self, gestures: &GestureSet, score: F) -> EmgResult<Vec<f64>>
    where
        F: Fn(usize, &dyn Classifier, ArrayView2<f64>, ArrayView2<f64>, &[usize]) -> EmgResult<Vec<f64>>,
    {
        let set = self.extractor.build_feature_matrix(gestures, &ChannelSelection::All)?;
        let folds = self.folds.split(&set.labels)?;

        let mut totals = vec![0.0; set.n_features()];
        for (i, fold) in folds.iter().enumerate() {
            let (x_train, y_train) = take_rows(set.features.view(), &set.labels, &fold.train);
            let (x_val, y_val) = take_rows(set.features.view(), &set.labels, &fold.validation);

            let mut model = self.provider.create(self.classifier);
            model.fit(x_train.view(), &y_train)?;
            let scores = score(i, model.as_ref(), x_train.view(), x_val.view(), &y_val)?;
            debug!(fold = i, model = model.name(), "fold importances computed");

            for (total, s) in totals.iter_mut().zip(&scores) {
                *total += s;
            }
        }

        let n_folds = folds.len() as f64;
        for total in totals.iter_mut() {
            *total /= n_folds;
        }
        Ok(set.collapse_to_channels(&totals))
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    use crate::dataset::GestureSet;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Rest plus two gestures over `n_channels` channels; gesture `g` drives channel `g`
    pub fn gestures(n_channels: usize, trials: usize, seed: u64) -> GestureSet {
        let mut rng = StdRng::seed_from_u64(seed);
        let classes = (0..3)
            .map(|class| {
                (0..trials)
                    .map(|_| {
                        Array2::from_shape_fn((90, n_channels), |(_, ch)| {
                            let gain = if class > 0 && ch == class { 6.0 } else { 1.0 };
                            gain * rng.gen_range(-1.0..1.0)
                        })
                    })
                    .collect()
            })
            .collect();
        GestureSet::new(classes).unwrap()
    }
}
