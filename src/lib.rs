//! EMG channel selection
//!
//! Ranks the channels of a multi-channel EMG recording by how well they
//! discriminate gestures and finds the smallest top-ranked subset with the best
//! cross-validated classification accuracy.
//!
//! The pipeline stages are:
//!
//! - Signal conditioning (zero-phase powerline notch + Butterworth band-pass)
//! - Rest baseline estimation and energy-based gesture segmentation
//! - Relative-energy feature extraction over three temporal windows
//! - Channel ranking by energy-ratio voting, mutual information, permutation
//!   importance or Kernel SHAP
//! - Subset search with stratified k-fold cross-validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emg_channel_select::{PipelineConfig, SelectionPipeline, SelectionRequest};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = SelectionPipeline::from_config(PipelineConfig::default());
//!     let request = SelectionRequest {
//!         ds: Some("GrabMyo".to_string()),
//!         no_of_channels: 4,
//!         ..Default::default()
//!     };
//!
//!     let report = pipeline.run(&request)?;
//!     println!("channels {:?} at {:.1}%", report.outcome.best_channels, report.outcome.accuracy);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod ml;
pub mod pipeline;
pub mod processing;
pub mod ranking;
pub mod search;
pub mod simulation;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{ConfigLoader, ModelPolicy, PipelineConfig, SegmentationFallback};
pub use dataset::{
    ChannelSelection, ClassMap, DatasetProvider, DatasetSelector, GestureSet, JsonDatasetProvider,
    RawGestureSet, Trial,
};
pub use error::{EmgError, EmgResult, ErrorResponse};
pub use ml::{Classifier, ClassifierKind, ClassifierProvider, StratifiedKFold};
pub use pipeline::{SelectionOutcome, SelectionPipeline, SelectionRequest, SelectionResponse};
pub use ranking::{ChannelRanker, RankedChannels, RankingMetric};
pub use search::{SubsetSearch, TrainingResult};
pub use simulation::{SyntheticConfig, SyntheticDataset};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
