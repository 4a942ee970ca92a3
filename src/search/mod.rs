// src/search/mod.rs
//! Subset search over the top-ranked channels
//!
//! Candidate subsets are always the `z` most important channels of a ranking.
//! Each candidate is scored by stratified k-fold cross-validation on the same
//! fold partition; only a strictly better mean accuracy replaces the current
//! best, so ties keep the smaller subset.

use crate::config::{ModelPolicy, PipelineConfig};
use crate::dataset::{ChannelSelection, GestureSet};
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::ml::cross_validation::cross_validate;
use crate::ml::{
    confusion_matrix, cross_val_predict, Classifier, ClassifierKind, ClassifierProvider,
    StratifiedKFold,
};
use crate::processing::FeatureExtractor;
use crate::ranking::RankedChannels;
use ndarray::Array2;
use std::fmt;
use tracing::{debug, info};

/// Cross-validated score of one candidate subset
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub channels: Vec<usize>,
    pub accuracy: f64,
    pub f1: f64,
}

impl CandidateScore {
    pub fn size(&self) -> usize {
        self.channels.len()
    }
}

/// Winning candidate of a search
pub struct TrainingResult {
    pub model: Box<dyn Classifier>,
    pub channels: Vec<usize>,
    /// Mean fold accuracy in [0, 1]
    pub accuracy: f64,
    pub f1: f64,
    /// Rows are true classes, columns predicted classes
    pub confusion_matrix: Array2<usize>,
    /// Every candidate in evaluation order
    pub evaluated: Vec<CandidateScore>,
}

impl fmt::Debug for TrainingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingResult")
            .field("model", &self.model.name())
            .field("channels", &self.channels)
            .field("accuracy", &self.accuracy)
            .field("f1", &self.f1)
            .field("confusion_matrix", &self.confusion_matrix)
            .field("evaluated", &self.evaluated.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SubsetSearch {
    extractor: FeatureExtractor,
    folds: StratifiedKFold,
    provider: ClassifierProvider,
    min_size: usize,
    max_size: usize,
    policy: ModelPolicy,
}

impl SubsetSearch {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config.features),
            folds: StratifiedKFold::from_config(&config.cross_validation),
            provider: ClassifierProvider::new(config.seed),
            min_size: config.search.min_subset_size,
            max_size: config.search.max_subset_size,
            policy: config.search.model_policy,
        }
    }

    pub fn with_policy(mut self, policy: ModelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Subset sizes to evaluate for a ranking of `n_ranked` channels
    pub fn candidate_sizes(&self, n_ranked: usize, explore_sizes: bool) -> EmgResult<Vec<usize>> {
        if n_ranked == 0 {
            return Err(EmgErrorBuilder::new("subset_search", "candidate_sizes")
                .invalid_data("ranked channels", "no channels to search"));
        }
        if !explore_sizes {
            return Ok(vec![n_ranked]);
        }
        if n_ranked < self.min_size {
            return Err(EmgErrorBuilder::new("subset_search", "candidate_sizes").mismatch(
                "ranked channels",
                "too few channels to explore subset sizes",
                format!(">= {}", self.min_size),
                n_ranked,
            ));
        }
        Ok((self.min_size..=self.max_size.min(n_ranked)).collect())
    }

    /// Evaluate the candidate subsets and return the best one
    pub fn search(
        &self,
        ranked: &RankedChannels,
        gestures: &GestureSet,
        explore_sizes: bool,
        classifier: ClassifierKind,
    ) -> EmgResult<TrainingResult> {
        let sizes = self.candidate_sizes(ranked.len(), explore_sizes)?;
        let labels: Vec<usize> = gestures.iter_trials().map(|(class, _)| class).collect();
        let folds = self.folds.split(&labels)?;

        let mut evaluated = Vec::with_capacity(sizes.len());
        let mut best: Option<(CandidateScore, Box<dyn Classifier>)> = None;

        for z in sizes {
            let channels = ranked.top(z).to_vec();
            let set = self
                .extractor
                .build_feature_matrix(gestures, &ChannelSelection::Subset(channels.clone()))?;
            let scores = cross_validate(&self.provider, classifier, set.features.view(), &set.labels, &folds)?;

            let candidate = CandidateScore {
                channels,
                accuracy: scores.mean_accuracy(),
                f1: scores.mean_f1(),
            };
            debug!(
                size = z,
                accuracy = candidate.accuracy,
                f1 = candidate.f1,
                "candidate subset evaluated"
            );

            let improves = best
                .as_ref()
                .map_or(true, |(current, _)| candidate.accuracy > current.accuracy);
            if improves {
                best = Some((candidate.clone(), scores.last_model));
            }
            evaluated.push(candidate);
        }

        let (winner, last_model) = best.ok_or_else(|| {
            EmgErrorBuilder::new("subset_search", "search").invalid_data("candidates", "nothing evaluated")
        })?;

        let set = self
            .extractor
            .build_feature_matrix(gestures, &ChannelSelection::Subset(winner.channels.clone()))?;
        let predicted = cross_val_predict(&self.provider, classifier, set.features.view(), &set.labels, &folds)?;
        let matrix = confusion_matrix(&set.labels, &predicted, gestures.n_classes());

        let model = self.returned_model(last_model, classifier, &set.features, &set.labels)?;
        info!(
            channels = ?winner.channels,
            accuracy = winner.accuracy,
            f1 = winner.f1,
            candidates = evaluated.len(),
            "subset search finished"
        );

        Ok(TrainingResult {
            model,
            channels: winner.channels,
            accuracy: winner.accuracy,
            f1: winner.f1,
            confusion_matrix: matrix,
            evaluated,
        })
    }

    fn returned_model(
        &self,
        last_model: Box<dyn Classifier>,
        classifier: ClassifierKind,
        features: &Array2<f64>,
        labels: &[usize],
    ) -> EmgResult<Box<dyn Classifier>> {
        match self.policy {
            ModelPolicy::LastFold => Ok(last_model),
            ModelPolicy::RefitFull => {
                let mut model = self.provider.create(classifier);
                model.fit(features.view(), labels)?;
                Ok(model)
            }
        }
    }
}
