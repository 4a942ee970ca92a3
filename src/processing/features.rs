// src/processing/features.rs
//! Relative-energy feature vectors
//!
//! A trial is split into three equal contiguous windows. For every window the
//! RMS of each selected channel is divided by the mean RMS over those channels,
//! and the windows are concatenated, so feature `k` always belongs to the
//! `k % n_channels`-th selected channel.

use crate::config::constants::features::FEATURE_WINDOWS;
use crate::config::FeatureConfig;
use crate::dataset::{ChannelSelection, GestureSet};
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::utils::column_rms;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

/// Feature matrix with one row per trial and the class id of each row
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
    /// Number of channels the features were extracted from
    pub n_channels: usize,
}

impl FeatureSet {
    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Channel position (within the selection) that owns feature `k`
    pub fn channel_of(&self, feature: usize) -> usize {
        feature % self.n_channels
    }

    /// Sum per-feature scores into per-channel scores
    pub fn collapse_to_channels(&self, scores: &[f64]) -> Vec<f64> {
        let mut channels = vec![0.0; self.n_channels];
        for (k, score) in scores.iter().enumerate() {
            channels[self.channel_of(k)] += score;
        }
        channels
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    epsilon: f64,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            epsilon: config.epsilon,
        }
    }

    /// Feature vector of length `3 * |selection|` for one trial
    pub fn extract(&self, trial: ArrayView2<f64>, selection: &ChannelSelection) -> EmgResult<Array1<f64>> {
        let channels = selection.indices(trial.ncols())?;
        let samples = trial.nrows();
        if samples < FEATURE_WINDOWS {
            return Err(EmgErrorBuilder::new("feature_extractor", "extract").mismatch(
                "trial",
                "too few samples for feature windows",
                format!(">= {}", FEATURE_WINDOWS),
                samples,
            ));
        }
        if channels.is_empty() {
            return Err(EmgErrorBuilder::new("feature_extractor", "extract")
                .invalid_data("channel selection", "no channels selected"));
        }

        let selected = trial.select(Axis(1), &channels);
        let window_len = samples / FEATURE_WINDOWS;
        let n = channels.len();

        let mut features = Array1::<f64>::zeros(FEATURE_WINDOWS * n);
        for w in 0..FEATURE_WINDOWS {
            let window = selected.slice(s![w * window_len..(w + 1) * window_len, ..]);
            let rms = column_rms(window);
            let mean = rms.mean().unwrap_or(0.0).max(self.epsilon);
            features
                .slice_mut(s![w * n..(w + 1) * n])
                .assign(&(rms / mean));
        }

        Ok(features)
    }

    /// Stack one feature row per trial, in class order
    pub fn build_feature_matrix(&self, gestures: &GestureSet, selection: &ChannelSelection) -> EmgResult<FeatureSet> {
        let n_channels = selection.indices(gestures.n_channels())?.len();
        let n_features = FEATURE_WINDOWS * n_channels;

        let mut features = Array2::<f64>::zeros((gestures.n_trials(), n_features));
        let mut labels = Vec::with_capacity(gestures.n_trials());

        for ((class, trial), mut row) in gestures.iter_trials().zip(features.axis_iter_mut(Axis(0))) {
            row.assign(&self.extract(trial.view(), selection)?);
            labels.push(class);
        }

        Ok(FeatureSet {
            features,
            labels,
            n_channels,
        })
    }
}
