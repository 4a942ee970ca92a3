// src/ranking/permutation.rs
//! Cross-validated permutation importance ranking

use super::{ChannelRanker, FoldedImportance, RankedChannels};
use crate::config::PipelineConfig;
use crate::dataset::GestureSet;
use crate::error::EmgResult;
use crate::ml::importance::permutation_importance;
use crate::ml::{ClassifierKind, ClassifierProvider, StratifiedKFold};
use crate::processing::FeatureExtractor;

/// Ranks channels by the accuracy lost when their features are shuffled
#[derive(Debug, Clone)]
pub struct PermutationRanker {
    scaffold: FoldedImportance,
    n_repeats: usize,
    seed: u64,
}

impl PermutationRanker {
    pub fn new(
        extractor: FeatureExtractor,
        folds: StratifiedKFold,
        provider: ClassifierProvider,
        classifier: ClassifierKind,
        n_repeats: usize,
    ) -> Self {
        let seed = provider.seed();
        Self {
            scaffold: FoldedImportance {
                extractor,
                folds,
                provider,
                classifier,
            },
            n_repeats,
            seed,
        }
    }

    pub fn from_config(config: &PipelineConfig, classifier: ClassifierKind) -> Self {
        Self::new(
            FeatureExtractor::new(&config.features),
            StratifiedKFold::from_config(&config.cross_validation),
            ClassifierProvider::new(config.seed),
            classifier,
            config.ranking.permutation_repeats,
        )
    }
}

impl ChannelRanker for PermutationRanker {
    fn name(&self) -> &'static str {
        "Permutation Importance"
    }

    fn rank(&self, gestures: &GestureSet) -> EmgResult<RankedChannels> {
        let scores = self.scaffold.channel_scores(gestures, |_, model, _, x_val, y_val| {
            permutation_importance(model, x_val, y_val, self.n_repeats, self.seed)
        })?;
        Ok(RankedChannels::from_scores(&scores))
    }
}
