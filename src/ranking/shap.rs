// src/ranking/shap.rs
//! Cross-validated Kernel SHAP ranking

use super::{ChannelRanker, FoldedImportance, RankedChannels};
use crate::config::PipelineConfig;
use crate::dataset::GestureSet;
use crate::error::EmgResult;
use crate::ml::kmeans::weighted_kmeans;
use crate::ml::shap::KernelExplainer;
use crate::ml::{ClassifierKind, ClassifierProvider, StratifiedKFold};
use crate::processing::FeatureExtractor;
use tracing::debug;

/// Ranks channels by mean absolute SHAP attribution on held-out trials
#[derive(Debug, Clone)]
pub struct ShapRanker {
    scaffold: FoldedImportance,
    background_size: usize,
    max_coalitions: usize,
    seed: u64,
}

impl ShapRanker {
    pub fn new(
        extractor: FeatureExtractor,
        folds: StratifiedKFold,
        provider: ClassifierProvider,
        classifier: ClassifierKind,
        background_size: usize,
        max_coalitions: usize,
    ) -> Self {
        let seed = provider.seed();
        Self {
            scaffold: FoldedImportance {
                extractor,
                folds,
                provider,
                classifier,
            },
            background_size,
            max_coalitions,
            seed,
        }
    }

    pub fn from_config(config: &PipelineConfig, classifier: ClassifierKind) -> Self {
        Self::new(
            FeatureExtractor::new(&config.features),
            StratifiedKFold::from_config(&config.cross_validation),
            ClassifierProvider::new(config.seed),
            classifier,
            config.ranking.shap_background_size,
            config.ranking.shap_max_coalitions,
        )
    }
}

impl ChannelRanker for ShapRanker {
    fn name(&self) -> &'static str {
        "SHAP"
    }

    fn rank(&self, gestures: &GestureSet) -> EmgResult<RankedChannels> {
        let scores = self.scaffold.channel_scores(gestures, |fold, model, x_train, x_val, _| {
            let seed = self.seed.wrapping_add(fold as u64);
            let background = weighted_kmeans(x_train, self.background_size, seed);
            debug!(fold, background = background.len(), "kernel SHAP background summarised");

            let explainer = KernelExplainer::new(model, background, self.max_coalitions, seed)?;
            explainer.mean_abs_importance(x_val)
        })?;
        Ok(RankedChannels::from_scores(&scores))
    }
}
