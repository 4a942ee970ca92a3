// src/pipeline.rs
//! Request orchestration
//!
//! One [`SelectionRequest`] runs synchronously through loading, optional
//! conditioning and segmentation, channel ranking and subset search, and ends in
//! a [`SelectionResponse`]. Nothing is shared between requests.

use crate::config::{PipelineConfig, SegmentationFallback};
use crate::dataset::{
    BuiltInDataset, ClassMap, DatasetProvider, DatasetSelector, GestureSet, JsonDatasetProvider,
};
use crate::error::{Capability, EmgErrorBuilder, EmgResult, ErrorResponse};
use crate::ml::ClassifierKind;
use crate::processing::{rest_rms_profile, GestureSegmenter, SignalConditioner};
use crate::ranking::{RankedChannels, RankingMetric};
use crate::search::{SubsetSearch, TrainingResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dataset name that selects an uploaded file
pub const CUSTOM_DATASET_NAME: &str = "Custom";

/// Parameters of one channel selection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRequest {
    /// Built-in dataset name; absent or `"Custom"` selects an upload
    #[serde(default)]
    pub ds: Option<String>,

    /// Native gesture ids to keep besides rest; empty keeps all
    #[serde(default)]
    pub selected_gestures: Vec<u32>,

    /// Upper bound on reported channels; 0 disables the bound
    #[serde(default, deserialize_with = "lenient_count")]
    pub no_of_channels: usize,

    #[serde(default)]
    pub classifier: Option<String>,

    #[serde(default)]
    pub metric: Option<String>,

    /// Channels of the area of interest; empty uses every channel
    #[serde(default)]
    pub area_no_of_channels: Vec<usize>,

    /// Sampling rate of a custom dataset in Hz
    #[serde(default)]
    pub fs: f64,

    #[serde(default = "default_preprocess", deserialize_with = "lenient_flag")]
    pub apply_preprocess: bool,

    #[serde(default)]
    pub ds_filename: Option<String>,

    /// Explore subset sizes instead of evaluating a single candidate
    #[serde(default)]
    pub optimize_toggle: bool,
}

impl Default for SelectionRequest {
    fn default() -> Self {
        Self {
            ds: None,
            selected_gestures: Vec::new(),
            no_of_channels: 0,
            classifier: None,
            metric: None,
            area_no_of_channels: Vec::new(),
            fs: 0.0,
            apply_preprocess: default_preprocess(),
            ds_filename: None,
            optimize_toggle: false,
        }
    }
}

fn default_preprocess() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Text(String),
}

/// Accepts booleans as well as `"True"` / `"False"` strings
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match FlagValue::deserialize(deserializer)? {
        FlagValue::Bool(flag) => flag,
        FlagValue::Text(text) => !text.eq_ignore_ascii_case("false"),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountValue {
    Number(usize),
    Text(String),
}

/// Accepts integers as well as numeric strings
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    match CountValue::deserialize(deserializer)? {
        CountValue::Number(n) => Ok(n),
        CountValue::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl SelectionRequest {
    /// Parse a JSON request body
    pub fn from_json(content: &str) -> EmgResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Dataset this request refers to
    pub fn selector(&self) -> EmgResult<DatasetSelector> {
        match self.ds.as_deref() {
            None | Some(CUSTOM_DATASET_NAME) => {
                let filename = self
                    .ds_filename
                    .as_deref()
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| EmgErrorBuilder::new("pipeline", "validate").configuration("filename missing!"))?;
                Ok(DatasetSelector::Custom {
                    filename: filename.to_string(),
                })
            }
            Some(name) => BuiltInDataset::from_name(name).map(DatasetSelector::BuiltIn).ok_or_else(|| {
                EmgErrorBuilder::new("pipeline", "validate")
                    .capability(Capability::DatasetProvider, format!("unknown dataset '{}'", name))
            }),
        }
    }
}

/// Successful selection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    /// Winning channels in the dataset's own numbering
    pub best_channels: Vec<usize>,
    /// Mean cross-validated accuracy, 0-100
    pub accuracy: f64,
    /// Mean cross-validated macro F1, 0-1
    pub f1: f64,
    pub confusion_matrix: Vec<Vec<usize>>,
}

/// Body sent back for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectionResponse {
    Success(SelectionOutcome),
    Failure(ErrorResponse),
}

impl SelectionResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, SelectionResponse::Success(_))
    }

    pub fn to_json(&self) -> EmgResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Validated request with its gestures loaded and prepared
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub selector: DatasetSelector,
    pub gestures: GestureSet,
    pub class_map: ClassMap,
    /// Area restriction; position `i` of the working set is channel `area[i]`
    pub area: Vec<usize>,
    pub metric: RankingMetric,
    pub classifier: ClassifierKind,
}

impl PreparedRequest {
    /// Map working-set channel positions back to dataset channel numbers
    pub fn to_dataset_channels(&self, channels: &[usize]) -> Vec<usize> {
        if self.area.is_empty() {
            return channels.to_vec();
        }
        channels.iter().map(|&c| self.area[c]).collect()
    }
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct SelectionReport {
    pub outcome: SelectionOutcome,
    pub ranking: RankedChannels,
    pub training: TrainingResult,
}

/// Channel selection pipeline bound to one configuration and dataset source
pub struct SelectionPipeline {
    config: PipelineConfig,
    provider: Arc<dyn DatasetProvider>,
}

impl SelectionPipeline {
    pub fn new(config: PipelineConfig, provider: Arc<dyn DatasetProvider>) -> Self {
        Self { config, provider }
    }

    /// Pipeline reading JSON datasets from the configured directories
    pub fn from_config(config: PipelineConfig) -> Self {
        let provider = Arc::new(JsonDatasetProvider::from_config(&config.data));
        Self::new(config, provider)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a request and turn failures into an error body
    pub fn respond(&self, request: &SelectionRequest) -> SelectionResponse {
        match self.run(request) {
            Ok(report) => SelectionResponse::Success(report.outcome),
            Err(err) => {
                warn!(error = %err, "selection request failed");
                SelectionResponse::Failure(err.to_response())
            }
        }
    }

    /// Rank, search and report
    pub fn run(&self, request: &SelectionRequest) -> EmgResult<SelectionReport> {
        let prepared = self.prepare(request)?;

        let ranker = prepared.metric.ranker(&self.config, prepared.classifier);
        let mut ranking = ranker.rank(&prepared.gestures)?;
        info!(metric = ranker.name(), ranking = %ranking, "channels ranked");

        let n = request.no_of_channels;
        if n > 0 && (!request.optimize_toggle || prepared.area.is_empty()) {
            ranking.truncate_to_top(n);
            debug!(kept = ranking.len(), "ranking truncated");
        }

        let training = SubsetSearch::from_config(&self.config).search(
            &ranking,
            &prepared.gestures,
            request.optimize_toggle,
            prepared.classifier,
        )?;

        let outcome = SelectionOutcome {
            best_channels: prepared.to_dataset_channels(&training.channels),
            accuracy: training.accuracy * 100.0,
            f1: training.f1,
            confusion_matrix: training
                .confusion_matrix
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
        };
        info!(
            dataset = %prepared.selector,
            channels = ?outcome.best_channels,
            accuracy = outcome.accuracy,
            "selection finished"
        );

        Ok(SelectionReport {
            outcome,
            ranking,
            training,
        })
    }

    /// Validate, load, remap, restrict and (for uploads) condition and segment
    pub fn prepare(&self, request: &SelectionRequest) -> EmgResult<PreparedRequest> {
        let selector = request.selector()?;
        if selector.is_custom() && (request.fs.is_nan() || request.fs <= 0.0) {
            return Err(EmgErrorBuilder::new("pipeline", "validate").configuration("sampling rate missing!"));
        }
        let metric = RankingMetric::from_name(request.metric.as_deref())?;
        let classifier = ClassifierKind::from_name(request.classifier.as_deref())?;

        let raw = self.provider.load(&selector)?;
        let (gestures, class_map) =
            raw.into_gesture_set(&request.selected_gestures, self.config.data.rest_gesture_id)?;
        info!(
            dataset = %selector,
            classes = gestures.n_classes(),
            trials = gestures.n_trials(),
            channels = gestures.n_channels(),
            "dataset loaded"
        );

        let area = request.area_no_of_channels.clone();
        let gestures = if area.is_empty() {
            gestures
        } else {
            gestures.restrict_channels(&area)?
        };

        let gestures = if selector.is_custom() && request.apply_preprocess {
            self.preprocess(gestures, request.fs)?
        } else {
            gestures
        };

        Ok(PreparedRequest {
            selector,
            gestures,
            class_map,
            area,
            metric,
            classifier,
        })
    }

    /// Condition every trial, then cut each gesture trial to its active segment
    pub fn preprocess(&self, gestures: GestureSet, sampling_rate: f64) -> EmgResult<GestureSet> {
        let filters = SignalConditioner::new(self.config.conditioning.clone()).design(sampling_rate)?;
        let conditioned = gestures.try_map_trials(|_, trial| filters.apply(trial.view()))?;

        let rest_rms = rest_rms_profile(conditioned.rest())?;
        let segmenter = GestureSegmenter::from_config(&self.config.segmentation)?;
        let fallback = self.config.segmentation.fallback;

        let mut kept_whole = 0usize;
        let segmented = conditioned.try_map_trials(|class, trial| {
            if class == 0 {
                return Ok(trial);
            }
            let segment = segmenter.segment(trial.view(), rest_rms.view())?;
            if !segment.is_empty() {
                return Ok(segment.apply(trial.view()));
            }
            match fallback {
                SegmentationFallback::KeepOriginal => {
                    warn!(class, samples = trial.nrows(), "no active window found, keeping whole trial");
                    kept_whole += 1;
                    Ok(trial)
                }
                SegmentationFallback::Fail => Err(EmgErrorBuilder::new("pipeline", "preprocess")
                    .invalid_data("trial", format!("no active window found in a class {} trial", class))),
            }
        })?;

        info!(sampling_rate, kept_whole, "trials conditioned and segmented");
        Ok(segmented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{InMemoryDatasetProvider, RawGesture, RawGestureSet};
    use crate::error::EmgError;
    use crate::simulation::{SyntheticConfig, SyntheticDataset};
    use ndarray::Array2;

    fn raw_set() -> RawGestureSet {
        let trial = |gain: f64, ch: usize| {
            Array2::from_shape_fn((60, 4), move |(i, c)| {
                let g = if c == ch { gain } else { 1.0 };
                g * (((i * 7 + c * 3) % 11) as f64 - 5.0)
            })
        };
        RawGestureSet::new(vec![
            RawGesture { gesture: 7, trials: (0..4).map(|_| trial(1.0, 0)).collect() },
            RawGesture { gesture: 0, trials: (0..4).map(|_| trial(1.0, 0)).collect() },
            RawGesture { gesture: 9, trials: (0..4).map(|_| trial(5.0, 2)).collect() },
        ])
    }

    fn pipeline() -> SelectionPipeline {
        let provider = InMemoryDatasetProvider::new(raw_set());
        SelectionPipeline::new(PipelineConfig::default(), Arc::new(provider))
    }

    #[test]
    fn test_request_defaults_and_lenient_fields() {
        let request = SelectionRequest::from_json(
            r#"{"ds": "GrabMyo", "no_of_channels": "4", "apply_preprocess": "False"}"#,
        )
        .unwrap();
        assert_eq!(request.no_of_channels, 4);
        assert!(!request.apply_preprocess);
        assert!(!request.optimize_toggle);
        assert_eq!(
            request.selector().unwrap(),
            DatasetSelector::BuiltIn(BuiltInDataset::GrabMyo)
        );

        let request = SelectionRequest::from_json("{}").unwrap();
        assert!(request.apply_preprocess);
        assert!(request.selector().unwrap_err().is_configuration());
    }

    #[test]
    fn test_custom_dataset_requires_sampling_rate() {
        let request = SelectionRequest {
            ds: Some("Custom".into()),
            ds_filename: Some("upload.json".into()),
            ..Default::default()
        };
        let err = pipeline().run(&request).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.to_response().error, "sampling rate missing!");
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let base = SelectionRequest {
            ds: Some("DELTA".into()),
            ..Default::default()
        };
        let unknown_metric = SelectionRequest { metric: Some("Variance".into()), ..base.clone() };
        let unknown_model = SelectionRequest { classifier: Some("Perceptron".into()), ..base.clone() };
        let unknown_dataset = SelectionRequest { ds: Some("MyoSet".into()), ..base };

        for request in [unknown_metric, unknown_model, unknown_dataset] {
            assert!(matches!(
                pipeline().run(&request),
                Err(EmgError::Capability { .. })
            ));
        }
    }

    #[test]
    fn test_prepare_remaps_and_restricts() {
        let request = SelectionRequest {
            ds: Some("DELTA".into()),
            area_no_of_channels: vec![3, 2],
            ..Default::default()
        };
        let prepared = pipeline().prepare(&request).unwrap();
        assert_eq!(prepared.class_map.class_of(0), Some(0));
        assert_eq!(prepared.class_map.class_of(7), Some(1));
        assert_eq!(prepared.class_map.class_of(9), Some(2));
        assert_eq!(prepared.gestures.n_channels(), 2);
        assert_eq!(prepared.to_dataset_channels(&[1, 0]), vec![2, 3]);

        let request = SelectionRequest { area_no_of_channels: vec![4], ..request };
        assert!(pipeline().prepare(&request).is_err());
    }

    #[test]
    fn test_selected_gestures_keep_rest() {
        let request = SelectionRequest {
            ds: Some("DELTA".into()),
            selected_gestures: vec![9],
            ..Default::default()
        };
        let prepared = pipeline().prepare(&request).unwrap();
        assert_eq!(prepared.gestures.n_classes(), 2);
        assert_eq!(prepared.class_map.native_of(1), Some(9));
    }

    fn with_silent_trial() -> GestureSet {
        let raw = SyntheticDataset::new(SyntheticConfig::default()).generate();
        let (gestures, _) = raw.into_gesture_set(&[], 0).unwrap();
        let mut silenced = false;
        gestures
            .try_map_trials(|class, trial| {
                if class == 1 && !silenced {
                    silenced = true;
                    return Ok(Array2::zeros(trial.dim()));
                }
                Ok(trial)
            })
            .unwrap()
    }

    fn pipeline_with_fallback(fallback: SegmentationFallback) -> SelectionPipeline {
        let mut config = PipelineConfig::default();
        config.segmentation.fallback = fallback;
        SelectionPipeline::new(config, Arc::new(InMemoryDatasetProvider::new(raw_set())))
    }

    #[test]
    fn test_preprocess_keeps_silent_trial_whole() {
        let gestures = with_silent_trial();
        let processed = pipeline_with_fallback(SegmentationFallback::KeepOriginal)
            .preprocess(gestures, 2000.0)
            .unwrap();

        assert!(processed.rest().iter().all(|t| t.nrows() == 2000));
        let class_1 = processed.class(1).unwrap();
        assert_eq!(class_1[0].nrows(), 2000);
        assert!(class_1[0].iter().all(|&v| v == 0.0));
        for trial in class_1[1..].iter().chain(processed.class(2).unwrap()) {
            assert!(trial.nrows() < 2000, "active trial not cropped: {}", trial.nrows());
            assert!(trial.nrows() > 0);
            assert_eq!(trial.nrows() % 150, 0);
        }
    }

    #[test]
    fn test_preprocess_fail_policy_rejects_silent_trial() {
        let err = pipeline_with_fallback(SegmentationFallback::Fail)
            .preprocess(with_silent_trial(), 2000.0)
            .unwrap_err();
        assert!(matches!(err, EmgError::InvalidData { .. }));
        assert!(err.to_string().contains("no active window found in a class 1 trial"));
    }

    #[test]
    fn test_preprocess_fail_policy_accepts_active_trials() {
        let raw = SyntheticDataset::new(SyntheticConfig::default()).generate();
        let (gestures, _) = raw.into_gesture_set(&[], 0).unwrap();
        let processed = pipeline_with_fallback(SegmentationFallback::Fail)
            .preprocess(gestures, 2000.0)
            .unwrap();
        assert!(processed.class(1).unwrap().iter().all(|t| t.nrows() < 2000));
    }

    #[test]
    fn test_missing_selected_gesture_aborts() {
        let request = SelectionRequest {
            ds: Some("DELTA".into()),
            selected_gestures: vec![999],
            ..Default::default()
        };
        assert!(matches!(pipeline().run(&request), Err(EmgError::InvalidData { .. })));
    }

    #[test]
    fn test_duplicate_area_channels_abort() {
        let request = SelectionRequest {
            ds: Some("DELTA".into()),
            area_no_of_channels: vec![0, 0, 1, 1],
            ..Default::default()
        };
        let err = pipeline().run(&request).unwrap_err();
        assert!(err.to_string().contains("duplicate channel index"));
    }

    #[test]
    fn test_respond_serialises_error_body() {
        let response = pipeline().respond(&SelectionRequest::default());
        assert!(!response.is_success());
        assert_eq!(response.to_json().unwrap().replace(char::is_whitespace, ""), r#"{"error":"filenamemissing!"}"#);
    }
}
