// src/processing/mod.rs
//! Signal processing stages applied to recorded trials

pub mod baseline;
pub mod conditioner;
pub mod features;
pub mod filters;
pub mod segmentation;

pub use baseline::{aggregate_rest, rest_rms_profile, RestBaseline};
pub use conditioner::{ConditioningFilters, SignalConditioner};
pub use features::{FeatureExtractor, FeatureSet};
pub use segmentation::{GestureSegmenter, Segment};
