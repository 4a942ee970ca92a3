// src/dataset/provider.rs
//! Dataset providers
//!
//! A dataset file is a JSON array of `{"gesture": <id>, "trials": [...]}`
//! records, each trial being a list of samples and each sample a list of
//! channel values.

use super::{DatasetSelector, RawGesture, RawGestureSet, Trial};
use crate::config::DataConfig;
use crate::error::{Capability, EmgError, EmgErrorBuilder, EmgResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Source of raw gesture recordings
pub trait DatasetProvider: Send + Sync {
    /// Load every gesture of the selected dataset in storage order
    fn load(&self, selector: &DatasetSelector) -> EmgResult<RawGestureSet>;
}

#[derive(Debug, Serialize, Deserialize)]
struct GestureRecord {
    gesture: u32,
    trials: Vec<Vec<Vec<f64>>>,
}

/// Reads built-in datasets from the datasets directory and custom uploads
/// from the upload directory
#[derive(Debug, Clone)]
pub struct JsonDatasetProvider {
    upload_dir: PathBuf,
    datasets_dir: PathBuf,
}

impl JsonDatasetProvider {
    pub fn new(upload_dir: impl Into<PathBuf>, datasets_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            datasets_dir: datasets_dir.into(),
        }
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new(config.upload_dir.clone(), config.datasets_dir.clone())
    }

    /// File backing `selector`
    pub fn resolve(&self, selector: &DatasetSelector) -> EmgResult<PathBuf> {
        match selector {
            DatasetSelector::BuiltIn(ds) => Ok(self
                .datasets_dir
                .join(format!("ds{}_gestures.json", ds.number()))),
            DatasetSelector::Custom { filename } => {
                let relative = Path::new(filename);
                let plain = relative.components().count() == 1
                    && matches!(relative.components().next(), Some(Component::Normal(_)));
                if !plain {
                    return Err(EmgErrorBuilder::new("json_dataset_provider", "resolve")
                        .configuration(format!("invalid dataset filename '{}'", filename)));
                }
                Ok(self.upload_dir.join(relative))
            }
        }
    }

    /// Parse a dataset document
    pub fn parse(content: &str) -> EmgResult<RawGestureSet> {
        let records: Vec<GestureRecord> = serde_json::from_str(content)?;

        let mut gestures = Vec::with_capacity(records.len());
        for record in records {
            let trials = record
                .trials
                .into_iter()
                .enumerate()
                .map(|(i, rows)| trial_from_rows(rows, record.gesture, i))
                .collect::<EmgResult<Vec<_>>>()?;
            gestures.push(RawGesture {
                gesture: record.gesture,
                trials,
            });
        }
        Ok(RawGestureSet::new(gestures))
    }

    /// Serialise a gesture set in the provider's file format
    pub fn to_json(raw: &RawGestureSet) -> EmgResult<String> {
        let records: Vec<GestureRecord> = raw
            .gestures
            .iter()
            .map(|g| GestureRecord {
                gesture: g.gesture,
                trials: g
                    .trials
                    .iter()
                    .map(|t| t.outer_iter().map(|row| row.to_vec()).collect())
                    .collect(),
            })
            .collect();
        Ok(serde_json::to_string(&records)?)
    }

    /// Write a gesture set to `path`
    pub fn write(raw: &RawGestureSet, path: &Path) -> EmgResult<()> {
        let content = Self::to_json(raw)?;
        std::fs::write(path, content).map_err(|e| EmgError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl DatasetProvider for JsonDatasetProvider {
    fn load(&self, selector: &DatasetSelector) -> EmgResult<RawGestureSet> {
        let path = self.resolve(selector)?;
        debug!(path = %path.display(), "reading dataset");

        let content = std::fs::read_to_string(&path).map_err(|e| EmgError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let raw = Self::parse(&content).map_err(|e| match e {
            EmgError::Parse { reason, .. } => EmgError::Parse {
                document: path.display().to_string(),
                reason,
            },
            other => other,
        })?;

        info!(
            dataset = %selector,
            gestures = raw.gestures.len(),
            "dataset loaded"
        );
        Ok(raw)
    }
}

/// Serves one fixed gesture set regardless of the selector
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatasetProvider {
    raw: RawGestureSet,
}

impl InMemoryDatasetProvider {
    pub fn new(raw: RawGestureSet) -> Self {
        Self { raw }
    }
}

impl DatasetProvider for InMemoryDatasetProvider {
    fn load(&self, _selector: &DatasetSelector) -> EmgResult<RawGestureSet> {
        if self.raw.gestures.is_empty() {
            return Err(EmgErrorBuilder::new("in_memory_dataset_provider", "load")
                .capability(Capability::DatasetProvider, "no dataset registered"));
        }
        Ok(self.raw.clone())
    }
}

fn trial_from_rows(rows: Vec<Vec<f64>>, gesture: u32, index: usize) -> EmgResult<Trial> {
    let samples = rows.len();
    let channels = rows.first().map(Vec::len).unwrap_or(0);
    if samples == 0 || channels == 0 {
        return Err(EmgErrorBuilder::new("json_dataset_provider", "parse").invalid_data(
            "trial",
            format!("gesture {} trial {} is empty", gesture, index),
        ));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != channels) {
        return Err(EmgErrorBuilder::new("json_dataset_provider", "parse").mismatch(
            "trial",
            format!("ragged samples in gesture {} trial {}", gesture, index),
            channels,
            bad.len(),
        ));
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((samples, channels), flat).map_err(|e| {
        EmgErrorBuilder::new("json_dataset_provider", "parse").invalid_data("trial", e.to_string())
    })
}
