use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use emg_channel_select::config::{ConditioningConfig, PipelineConfig};
use emg_channel_select::dataset::ChannelSelection;
use emg_channel_select::ml::ClassifierKind;
use emg_channel_select::processing::{FeatureExtractor, SignalConditioner};
use emg_channel_select::ranking::RankingMetric;
use emg_channel_select::search::SubsetSearch;
use emg_channel_select::{GestureSet, SyntheticConfig, SyntheticDataset};

const CHANNEL_COUNTS: &[usize] = &[4, 8, 16];

fn gestures(n_channels: usize) -> GestureSet {
    let raw = SyntheticDataset::new(SyntheticConfig {
        n_channels,
        samples_per_trial: 1000,
        ..Default::default()
    })
    .generate();
    raw.into_gesture_set(&[], 0).unwrap().0
}

fn benchmark_conditioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("conditioning");
    let conditioner = SignalConditioner::new(ConditioningConfig::default());
    let filters = conditioner.design(2000.0).unwrap();

    for &channels in CHANNEL_COUNTS {
        let set = gestures(channels);
        let trial = set.rest()[0].clone();
        group.throughput(Throughput::Elements((trial.nrows() * channels) as u64));
        group.bench_with_input(BenchmarkId::new("filtfilt", channels), &trial, |b, trial| {
            b.iter(|| filters.apply(black_box(trial.view())).unwrap());
        });
    }
    group.finish();
}

fn benchmark_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("features");
    let extractor = FeatureExtractor::default();

    for &channels in CHANNEL_COUNTS {
        let set = gestures(channels);
        group.bench_with_input(BenchmarkId::new("feature_matrix", channels), &set, |b, set| {
            b.iter(|| {
                extractor
                    .build_feature_matrix(black_box(set), &ChannelSelection::All)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn benchmark_rankings(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");
    group.sample_size(10);
    let config = PipelineConfig::default();
    let set = gestures(8);

    for metric in [
        RankingMetric::Rms,
        RankingMetric::MutualInformation,
        RankingMetric::PermutationImportance,
    ] {
        let ranker = metric.ranker(&config, ClassifierKind::Knn);
        group.bench_function(metric.name(), |b| {
            b.iter(|| ranker.rank(black_box(&set)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_subset_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("subset_search");
    group.sample_size(10);
    let config = PipelineConfig::default();
    let set = gestures(8);
    let ranked = RankingMetric::MutualInformation
        .ranker(&config, ClassifierKind::RandomForest)
        .rank(&set)
        .unwrap();
    let search = SubsetSearch::from_config(&config);

    for kind in [ClassifierKind::Knn, ClassifierKind::RandomForest] {
        group.bench_function(kind.name(), |b| {
            b.iter(|| search.search(black_box(&ranked), &set, true, kind).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_conditioning,
    benchmark_features,
    benchmark_rankings,
    benchmark_subset_search
);
criterion_main!(benches);
