// Property tests for channel rankings, feature layout and segmentation

use emg_channel_select::config::PipelineConfig;
use emg_channel_select::dataset::{ChannelSelection, GestureSet};
use emg_channel_select::ml::ClassifierKind;
use emg_channel_select::processing::{FeatureExtractor, GestureSegmenter};
use emg_channel_select::ranking::energy_ratio::consensus;
use emg_channel_select::ranking::RankingMetric;
use emg_channel_select::utils::standard_normal;
use ndarray::{Array1, Array2};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn gesture_set(n_channels: usize, trials: usize, samples: usize, seed: u64) -> GestureSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let classes = (0..3)
        .map(|class| {
            let driven = rng.gen_range(0..n_channels);
            (0..trials)
                .map(|_| {
                    Array2::from_shape_fn((samples, n_channels), |(_, ch)| {
                        let gain = if class > 0 && ch == driven { 4.0 } else { 1.0 };
                        gain * standard_normal(&mut rng)
                    })
                })
                .collect()
        })
        .collect();
    GestureSet::new(classes).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_cheap_rankings_are_permutations(
        n_channels in 2usize..7,
        trials in 4usize..7,
        seed in any::<u64>(),
    ) {
        let gestures = gesture_set(n_channels, trials, 60, seed);
        let config = PipelineConfig::default();

        for metric in [RankingMetric::Rms, RankingMetric::MutualInformation] {
            let ranked = metric.ranker(&config, ClassifierKind::RandomForest).rank(&gestures).unwrap();
            prop_assert!(ranked.is_permutation_of(n_channels), "{}: {}", metric, ranked);
        }
    }

    #[test]
    fn prop_feature_length_tracks_selection(
        samples in 3usize..200,
        subset in Just((0usize..6).collect::<Vec<_>>())
            .prop_shuffle()
            .prop_flat_map(|channels| (Just(channels), 1usize..=6))
            .prop_map(|(channels, keep)| channels[..keep].to_vec()),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let trial = Array2::from_shape_fn((samples, 6), |_| rng.gen_range(-1.0..1.0));
        let features = FeatureExtractor::default()
            .extract(trial.view(), &ChannelSelection::Subset(subset.clone()))
            .unwrap();
        prop_assert_eq!(features.len(), 3 * subset.len());
        prop_assert!(features.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn prop_consensus_keeps_only_shared_channels(
        rankings in proptest::collection::vec(
            Just((0usize..6).collect::<Vec<_>>()).prop_shuffle().prop_flat_map(|r| {
                let len = r.len();
                (Just(r), 1..=len)
            }).prop_map(|(r, keep)| r[..keep].to_vec()),
            1..5,
        ),
    ) {
        let result = consensus(&rankings);
        for channel in &result {
            prop_assert!(rankings.iter().all(|r| r.contains(channel)));
        }
        let shared = (0..6).filter(|c| rankings.iter().all(|r| r.contains(c))).count();
        prop_assert_eq!(result.len(), shared);
    }

    #[test]
    fn prop_resegmenting_never_expands(
        windows in 4usize..30,
        burst_start in 0usize..20,
        burst_len in 1usize..10,
        seed in any::<u64>(),
    ) {
        let window = 20;
        let samples = windows * window;
        let mut rng = StdRng::seed_from_u64(seed);
        let trial = Array2::from_shape_fn((samples, 3), |(i, _)| {
            let w = i / window;
            let gain = if w >= burst_start && w < burst_start + burst_len { 5.0 } else { 0.5 };
            gain * standard_normal(&mut rng)
        });
        let rest = Array1::from_elem(3, 0.5);
        let segmenter = GestureSegmenter::new(window, 3).unwrap();

        let first = segmenter.segment(trial.view(), rest.view()).unwrap();
        prop_assume!(!first.is_empty());
        prop_assert!(first.end <= samples);

        let cropped = first.apply(trial.view());
        let second = segmenter.segment(cropped.view(), rest.view()).unwrap();
        prop_assert!(second.len() <= first.len());
        prop_assert!(second.end <= cropped.nrows());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(3))]

    #[test]
    fn prop_model_based_rankings_are_permutations(
        n_channels in 2usize..5,
        seed in any::<u64>(),
    ) {
        let gestures = gesture_set(n_channels, 8, 60, seed);
        let mut config = PipelineConfig::default();
        config.ranking.permutation_repeats = 2;
        config.ranking.shap_background_size = 6;
        config.ranking.shap_max_coalitions = 32;

        for metric in [RankingMetric::PermutationImportance, RankingMetric::Shap] {
            let ranked = metric.ranker(&config, ClassifierKind::NaiveBayes).rank(&gestures).unwrap();
            prop_assert!(ranked.is_permutation_of(n_channels), "{}: {}", metric, ranked);
        }
    }
}
