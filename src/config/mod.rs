// src/config/mod.rs
//! Pipeline configuration
//!
//! Everything that used to be ambient state (upload directory, random seed,
//! filter parameters) lives in [`PipelineConfig`] and is handed to the pipeline
//! at construction time.

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration of one selection pipeline
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "defaults::seed")]
    pub seed: u64,

    #[serde(default)]
    pub conditioning: ConditioningConfig,

    #[serde(default)]
    pub segmentation: SegmentationConfig,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub cross_validation: CrossValidationConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub data: DataConfig,
}

/// Notch + band-pass settings of the signal conditioner
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConditioningConfig {
    #[serde(default = "defaults::powerline_hz")]
    pub powerline_hz: f64,

    #[serde(default = "defaults::notch_q")]
    pub notch_q: f64,

    #[serde(default = "defaults::bandpass_low_hz")]
    pub bandpass_low_hz: f64,

    #[serde(default = "defaults::bandpass_high_hz")]
    pub bandpass_high_hz: f64,

    #[serde(default = "defaults::bandpass_order")]
    pub bandpass_order: usize,
}

/// What to do with a gesture trial in which no active window was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationFallback {
    /// Keep the unsegmented trial
    KeepOriginal,
    /// Abort the request with a data error
    Fail,
}

/// Gesture segmenter settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SegmentationConfig {
    #[serde(default = "defaults::window_size")]
    pub window_size: usize,

    #[serde(default = "defaults::median_filter_size")]
    pub median_filter_size: usize,

    #[serde(default = "defaults::fallback")]
    pub fallback: SegmentationFallback,
}

/// Feature extractor settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeatureConfig {
    #[serde(default = "defaults::feature_epsilon")]
    pub epsilon: f64,
}

/// Stratified k-fold settings shared by ranking and subset search
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CrossValidationConfig {
    #[serde(default = "defaults::n_splits")]
    pub n_splits: usize,

    #[serde(default = "defaults::shuffle")]
    pub shuffle: bool,

    #[serde(default = "defaults::seed")]
    pub seed: u64,
}

/// Channel ranking settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RankingConfig {
    #[serde(default = "defaults::normalization_epsilon")]
    pub normalization_epsilon: f64,

    #[serde(default = "defaults::mi_neighbors")]
    pub mi_neighbors: usize,

    #[serde(default = "defaults::permutation_repeats")]
    pub permutation_repeats: usize,

    #[serde(default = "defaults::shap_background_size")]
    pub shap_background_size: usize,

    #[serde(default = "defaults::shap_max_coalitions")]
    pub shap_max_coalitions: usize,
}

/// Which classifier instance the subset search hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPolicy {
    /// The model fitted on the last cross-validation fold of the winning subset
    LastFold,
    /// A fresh model fitted on every instance of the winning subset
    RefitFull,
}

/// Subset search settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "defaults::min_subset_size")]
    pub min_subset_size: usize,

    #[serde(default = "defaults::max_subset_size")]
    pub max_subset_size: usize,

    #[serde(default = "defaults::model_policy")]
    pub model_policy: ModelPolicy,
}

/// Dataset locations and conventions
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DataConfig {
    #[serde(default = "defaults::upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "defaults::datasets_dir")]
    pub datasets_dir: PathBuf,

    #[serde(default = "defaults::rest_gesture_id")]
    pub rest_gesture_id: u32,
}

/// Default value providers using constants
mod defaults {
    use super::{ModelPolicy, SegmentationFallback};
    use crate::config::constants::*;
    use std::path::PathBuf;

    pub fn seed() -> u64 { cross_validation::DEFAULT_SEED }

    pub fn powerline_hz() -> f64 { conditioning::DEFAULT_POWERLINE_HZ }
    pub fn notch_q() -> f64 { conditioning::DEFAULT_NOTCH_Q }
    pub fn bandpass_low_hz() -> f64 { conditioning::DEFAULT_BANDPASS_LOW_HZ }
    pub fn bandpass_high_hz() -> f64 { conditioning::DEFAULT_BANDPASS_HIGH_HZ }
    pub fn bandpass_order() -> usize { conditioning::DEFAULT_BANDPASS_ORDER }

    pub fn window_size() -> usize { segmentation::DEFAULT_WINDOW_SIZE }
    pub fn median_filter_size() -> usize { segmentation::DEFAULT_MEDIAN_FILTER_SIZE }
    pub fn fallback() -> SegmentationFallback { SegmentationFallback::KeepOriginal }

    pub fn feature_epsilon() -> f64 { features::RMS_EPSILON }

    pub fn n_splits() -> usize { cross_validation::DEFAULT_N_SPLITS }
    pub fn shuffle() -> bool { true }

    pub fn normalization_epsilon() -> f64 { ranking::NORMALIZATION_EPSILON }
    pub fn mi_neighbors() -> usize { ranking::MI_NEIGHBORS }
    pub fn permutation_repeats() -> usize { ranking::PERMUTATION_REPEATS }
    pub fn shap_background_size() -> usize { ranking::SHAP_BACKGROUND_SIZE }
    pub fn shap_max_coalitions() -> usize { ranking::SHAP_MAX_COALITIONS }

    pub fn min_subset_size() -> usize { search::MIN_SUBSET_SIZE }
    pub fn max_subset_size() -> usize { search::MAX_SUBSET_SIZE }
    pub fn model_policy() -> ModelPolicy { ModelPolicy::LastFold }

    pub fn upload_dir() -> PathBuf { PathBuf::from(paths::DEFAULT_UPLOAD_DIR) }
    pub fn datasets_dir() -> PathBuf { PathBuf::from(paths::DEFAULT_DATASETS_DIR) }
    pub fn rest_gesture_id() -> u32 { data::REST_GESTURE_ID }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: defaults::seed(),
            conditioning: ConditioningConfig::default(),
            segmentation: SegmentationConfig::default(),
            features: FeatureConfig::default(),
            cross_validation: CrossValidationConfig::default(),
            ranking: RankingConfig::default(),
            search: SearchConfig::default(),
            data: DataConfig::default(),
        }
    }
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            powerline_hz: defaults::powerline_hz(),
            notch_q: defaults::notch_q(),
            bandpass_low_hz: defaults::bandpass_low_hz(),
            bandpass_high_hz: defaults::bandpass_high_hz(),
            bandpass_order: defaults::bandpass_order(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            window_size: defaults::window_size(),
            median_filter_size: defaults::median_filter_size(),
            fallback: defaults::fallback(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { epsilon: defaults::feature_epsilon() }
    }
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            n_splits: defaults::n_splits(),
            shuffle: defaults::shuffle(),
            seed: defaults::seed(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            normalization_epsilon: defaults::normalization_epsilon(),
            mi_neighbors: defaults::mi_neighbors(),
            permutation_repeats: defaults::permutation_repeats(),
            shap_background_size: defaults::shap_background_size(),
            shap_max_coalitions: defaults::shap_max_coalitions(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_subset_size: defaults::min_subset_size(),
            max_subset_size: defaults::max_subset_size(),
            model_policy: defaults::model_policy(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            upload_dir: defaults::upload_dir(),
            datasets_dir: defaults::datasets_dir(),
            rest_gesture_id: defaults::rest_gesture_id(),
        }
    }
}

impl PipelineConfig {
    /// Validate configuration consistency, collecting every problem found
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let c = &self.conditioning;
        if c.powerline_hz <= 0.0 {
            errors.push(format!("Powerline frequency must be positive, got {} Hz", c.powerline_hz));
        }
        if c.notch_q <= 0.0 {
            errors.push(format!("Notch quality factor must be positive, got {}", c.notch_q));
        }
        if c.bandpass_low_hz <= 0.0 || c.bandpass_low_hz >= c.bandpass_high_hz {
            errors.push(format!(
                "Band-pass edges must satisfy 0 < low < high, got {} Hz .. {} Hz",
                c.bandpass_low_hz, c.bandpass_high_hz
            ));
        }
        if !(conditioning::MIN_FILTER_ORDER..=conditioning::MAX_FILTER_ORDER).contains(&c.bandpass_order) {
            errors.push(format!(
                "Band-pass order must be {}-{}, got {}",
                conditioning::MIN_FILTER_ORDER,
                conditioning::MAX_FILTER_ORDER,
                c.bandpass_order
            ));
        }

        if self.segmentation.window_size == 0 {
            errors.push("Segmentation window size must be positive".to_string());
        }
        if self.segmentation.median_filter_size % 2 == 0 {
            errors.push(format!(
                "Median filter size must be odd, got {}",
                self.segmentation.median_filter_size
            ));
        }

        if self.cross_validation.n_splits < cross_validation::MIN_N_SPLITS {
            errors.push(format!(
                "Cross-validation needs at least {} folds, got {}",
                cross_validation::MIN_N_SPLITS,
                self.cross_validation.n_splits
            ));
        }

        if self.ranking.mi_neighbors == 0 {
            errors.push("Mutual information needs at least one neighbour".to_string());
        }
        if self.ranking.permutation_repeats == 0 {
            errors.push("Permutation importance needs at least one repeat".to_string());
        }
        if self.ranking.shap_background_size == 0 {
            errors.push("SHAP background summary must hold at least one point".to_string());
        }

        if self.search.min_subset_size < search::MIN_SUBSET_SIZE {
            errors.push(format!(
                "Smallest candidate subset must hold at least {} channels, got {}",
                search::MIN_SUBSET_SIZE,
                self.search.min_subset_size
            ));
        }
        if self.search.min_subset_size > self.search.max_subset_size {
            errors.push(format!(
                "Subset bounds reversed: {} > {}",
                self.search.min_subset_size, self.search.max_subset_size
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Check the band edges against the Nyquist limit of a concrete recording
    pub fn validate_for_sampling_rate(&self, sampling_rate_hz: f64) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let nyquist = sampling_rate_hz / 2.0;

        if sampling_rate_hz <= 0.0 {
            errors.push(format!("Sampling rate must be positive, got {} Hz", sampling_rate_hz));
        } else {
            if self.conditioning.bandpass_high_hz >= nyquist {
                errors.push(format!(
                    "Band-pass high edge ({} Hz) must be less than Nyquist frequency ({} Hz)",
                    self.conditioning.bandpass_high_hz, nyquist
                ));
            }
            if self.conditioning.powerline_hz >= nyquist {
                errors.push(format!(
                    "Notch frequency ({} Hz) must be less than Nyquist frequency ({} Hz)",
                    self.conditioning.powerline_hz, nyquist
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = PipelineConfig::default();
        assert_eq!(config.conditioning.powerline_hz, 50.0);
        assert_eq!(config.conditioning.bandpass_order, 4);
        assert_eq!(config.segmentation.window_size, 150);
        assert_eq!(config.cross_validation.n_splits, 4);
        assert_eq!(config.seed, 42);
        assert!(config.validate_consistency().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: PipelineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
[search]
max_subset_size = 8
model_policy = "refit_full"
        "#,
        )
        .unwrap();

        assert_eq!(config.search.max_subset_size, 8);
        assert_eq!(config.search.model_policy, ModelPolicy::RefitFull);
        assert_eq!(config.search.min_subset_size, 2);
        assert_eq!(config.segmentation.fallback, SegmentationFallback::KeepOriginal);
    }

    #[test]
    fn test_config_validation() {
        let mut config = PipelineConfig::default();
        config.segmentation.median_filter_size = 4;
        config.cross_validation.n_splits = 1;
        config.search.min_subset_size = 5;
        config.search.max_subset_size = 3;

        let errors = config.validate_consistency().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_nyquist_validation() {
        let config = PipelineConfig::default();
        assert!(config.validate_for_sampling_rate(2000.0).is_ok());
        assert!(config.validate_for_sampling_rate(800.0).is_err());
        assert!(config.validate_for_sampling_rate(0.0).is_err());
    }
}
