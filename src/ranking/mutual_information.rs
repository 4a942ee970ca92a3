// src/ranking/mutual_information.rs
//! Mutual information ranking

use super::{ChannelRanker, RankedChannels};
use crate::config::PipelineConfig;
use crate::dataset::{ChannelSelection, GestureSet};
use crate::error::EmgResult;
use crate::ml::importance::mutual_info_classif;
use crate::processing::FeatureExtractor;
use tracing::debug;

/// Sums the per-feature mutual information with the class over each channel
#[derive(Debug, Clone)]
pub struct MutualInformationRanker {
    extractor: FeatureExtractor,
    n_neighbors: usize,
    seed: u64,
}

impl MutualInformationRanker {
    pub fn new(extractor: FeatureExtractor, n_neighbors: usize, seed: u64) -> Self {
        Self {
            extractor,
            n_neighbors,
            seed,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            FeatureExtractor::new(&config.features),
            config.ranking.mi_neighbors,
            config.seed,
        )
    }

    /// Per-channel mutual information sums
    pub fn channel_scores(&self, gestures: &GestureSet) -> EmgResult<Vec<f64>> {
        let set = self.extractor.build_feature_matrix(gestures, &ChannelSelection::All)?;
        let mi = mutual_info_classif(set.features.view(), &set.labels, self.n_neighbors, self.seed)?;
        debug!(features = mi.len(), "mutual information estimated");
        Ok(set.collapse_to_channels(&mi))
    }
}

impl ChannelRanker for MutualInformationRanker {
    fn name(&self) -> &'static str {
        "Mutual Information"
    }

    fn rank(&self, gestures: &GestureSet) -> EmgResult<RankedChannels> {
        Ok(RankedChannels::from_scores(&self.channel_scores(gestures)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::test_data;

    #[test]
    fn test_informative_channels_rank_last() {
        let gestures = test_data::gestures(6, 10, 2);
        let ranker = MutualInformationRanker::from_config(&PipelineConfig::default());

        let scores = ranker.channel_scores(&gestures).unwrap();
        assert_eq!(scores.len(), 6);
        assert!(scores.iter().all(|&s| s >= 0.0));

        let ranked = ranker.rank(&gestures).unwrap();
        let mut top = ranked.top(2).to_vec();
        top.sort_unstable();
        assert_eq!(top, vec![1, 2]);
    }
}
