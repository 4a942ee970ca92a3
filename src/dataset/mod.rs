// src/dataset/mod.rs
//! Request-scoped data model: trials, gesture classes and channel selections

pub mod provider;

pub use provider::{DatasetProvider, InMemoryDatasetProvider, JsonDatasetProvider};

use crate::error::{EmgErrorBuilder, EmgResult};
use ndarray::{Array2, Axis};
use std::fmt;

/// One recording, shape `(samples, channels)`
pub type Trial = Array2<f64>;

/// Datasets bundled with the server installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltInDataset {
    CslHdemg,
    Delta,
    GrabMyo,
    PutEmg,
    Hyser,
    Nizamis,
}

impl BuiltInDataset {
    pub const ALL: [BuiltInDataset; 6] = [
        BuiltInDataset::CslHdemg,
        BuiltInDataset::Delta,
        BuiltInDataset::GrabMyo,
        BuiltInDataset::PutEmg,
        BuiltInDataset::Hyser,
        BuiltInDataset::Nizamis,
    ];

    /// Display name used in requests
    pub fn name(&self) -> &'static str {
        match self {
            BuiltInDataset::CslHdemg => "CSL-HDEMG",
            BuiltInDataset::Delta => "DELTA",
            BuiltInDataset::GrabMyo => "GrabMyo",
            BuiltInDataset::PutEmg => "PutEMG",
            BuiltInDataset::Hyser => "Hyser",
            BuiltInDataset::Nizamis => "Nizamis et al.",
        }
    }

    /// Numeric identifier used for the dataset file name
    pub fn number(&self) -> u32 {
        match self {
            BuiltInDataset::CslHdemg => 1,
            BuiltInDataset::Delta => 2,
            BuiltInDataset::GrabMyo => 3,
            BuiltInDataset::PutEmg => 4,
            BuiltInDataset::Hyser => 5,
            BuiltInDataset::Nizamis => 6,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ds| ds.name() == name)
    }
}

/// Which recordings a request works on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSelector {
    BuiltIn(BuiltInDataset),
    /// A previously uploaded file
    Custom { filename: String },
}

impl DatasetSelector {
    pub fn number(&self) -> u32 {
        match self {
            DatasetSelector::BuiltIn(ds) => ds.number(),
            DatasetSelector::Custom { .. } => crate::config::constants::data::CUSTOM_DATASET_NUMBER,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, DatasetSelector::Custom { .. })
    }
}

impl fmt::Display for DatasetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSelector::BuiltIn(ds) => write!(f, "{}", ds.name()),
            DatasetSelector::Custom { filename } => write!(f, "custom:{}", filename),
        }
    }
}

/// Trials of one gesture under its native identifier
#[derive(Debug, Clone, PartialEq)]
pub struct RawGesture {
    pub gesture: u32,
    pub trials: Vec<Trial>,
}

/// Gestures as delivered by a dataset provider, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGestureSet {
    pub gestures: Vec<RawGesture>,
}

impl RawGestureSet {
    pub fn new(gestures: Vec<RawGesture>) -> Self {
        Self { gestures }
    }

    pub fn gesture_ids(&self) -> Vec<u32> {
        self.gestures.iter().map(|g| g.gesture).collect()
    }

    /// Keep the rest gesture plus the selected ones, then remap to contiguous class ids
    ///
    /// An empty selection keeps every gesture.
    pub fn into_gesture_set(self, selected: &[u32], rest_gesture_id: u32) -> EmgResult<(GestureSet, ClassMap)> {
        if let Some(&missing) = selected.iter().find(|id| !self.gestures.iter().any(|g| g.gesture == **id)) {
            return Err(EmgErrorBuilder::new("gesture_set", "select").invalid_data(
                "gesture selection",
                format!("gesture {} not present in the dataset", missing),
            ));
        }

        let kept: Vec<RawGesture> = self
            .gestures
            .into_iter()
            .filter(|g| selected.is_empty() || g.gesture == rest_gesture_id || selected.contains(&g.gesture))
            .collect();

        let order: Vec<u32> = kept.iter().map(|g| g.gesture).collect();
        let class_map = ClassMap::new(&order, rest_gesture_id)?;
        if class_map.len() < 2 {
            return Err(EmgErrorBuilder::new("gesture_set", "select").invalid_data(
                "gesture selection",
                "at least one gesture besides rest required",
            ));
        }

        let mut classes: Vec<Vec<Trial>> = vec![Vec::new(); class_map.len()];
        for gesture in kept {
            if let Some(class) = class_map.class_of(gesture.gesture) {
                classes[class] = gesture.trials;
            }
        }

        Ok((GestureSet::new(classes)?, class_map))
    }
}

/// Bijection between native gesture identifiers and contiguous class ids
///
/// The rest gesture is always class `0`; the others follow in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    natives: Vec<u32>,
}

impl ClassMap {
    pub fn new(native_order: &[u32], rest_gesture_id: u32) -> EmgResult<Self> {
        if !native_order.contains(&rest_gesture_id) {
            return Err(EmgErrorBuilder::new("class_map", "new").invalid_data(
                "gesture set",
                format!("rest gesture {} not present", rest_gesture_id),
            ));
        }

        let mut natives = vec![rest_gesture_id];
        for &id in native_order {
            if id == rest_gesture_id {
                continue;
            }
            if natives.contains(&id) {
                return Err(EmgErrorBuilder::new("class_map", "new")
                    .invalid_data("gesture set", format!("gesture {} listed twice", id)));
            }
            natives.push(id);
        }
        Ok(Self { natives })
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }

    pub fn class_of(&self, native: u32) -> Option<usize> {
        self.natives.iter().position(|&n| n == native)
    }

    pub fn native_of(&self, class: usize) -> Option<u32> {
        self.natives.get(class).copied()
    }

    /// `(native, class)` pairs in class order
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        self.natives.iter().enumerate().map(|(class, &native)| (native, class))
    }
}

/// Trials grouped by contiguous class id, class `0` being rest
#[derive(Debug, Clone, PartialEq)]
pub struct GestureSet {
    classes: Vec<Vec<Trial>>,
    n_channels: usize,
}

impl GestureSet {
    /// Validate that every class holds trials with one common channel count
    pub fn new(classes: Vec<Vec<Trial>>) -> EmgResult<Self> {
        let n_channels = classes
            .iter()
            .flatten()
            .next()
            .map(|t| t.ncols())
            .ok_or_else(|| EmgErrorBuilder::new("gesture_set", "new").invalid_data("gesture set", "no trials"))?;

        for (class, trials) in classes.iter().enumerate() {
            if trials.is_empty() {
                return Err(EmgErrorBuilder::new("gesture_set", "new")
                    .invalid_data("gesture set", format!("class {} has no trials", class)));
            }
            for trial in trials {
                if trial.ncols() != n_channels {
                    return Err(EmgErrorBuilder::new("gesture_set", "new").mismatch(
                        "trial",
                        format!("channel count differs in class {}", class),
                        n_channels,
                        trial.ncols(),
                    ));
                }
            }
        }

        Ok(Self { classes, n_channels })
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn n_trials(&self) -> usize {
        self.classes.iter().map(Vec::len).sum()
    }

    pub fn class(&self, class: usize) -> Option<&[Trial]> {
        self.classes.get(class).map(Vec::as_slice)
    }

    pub fn classes(&self) -> &[Vec<Trial>] {
        &self.classes
    }

    /// Trials of the rest class
    pub fn rest(&self) -> &[Trial] {
        self.classes.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Trials paired with their class id, in class order
    pub fn iter_trials(&self) -> impl Iterator<Item = (usize, &Trial)> {
        self.classes
            .iter()
            .enumerate()
            .flat_map(|(class, trials)| trials.iter().map(move |t| (class, t)))
    }

    /// Keep only the listed channel columns, in the listed order
    pub fn restrict_channels(&self, channels: &[usize]) -> EmgResult<GestureSet> {
        let indices = ChannelSelection::Subset(channels.to_vec()).indices(self.n_channels)?;
        let classes = self
            .classes
            .iter()
            .map(|trials| trials.iter().map(|t| t.select(Axis(1), &indices)).collect())
            .collect();
        GestureSet::new(classes)
    }

    /// Replace every trial with the result of `f(class, trial)`
    pub fn try_map_trials<F>(self, mut f: F) -> EmgResult<GestureSet>
    where
        F: FnMut(usize, Trial) -> EmgResult<Trial>,
    {
        let mut classes = Vec::with_capacity(self.classes.len());
        for (class, trials) in self.classes.into_iter().enumerate() {
            let mapped = trials
                .into_iter()
                .map(|t| f(class, t))
                .collect::<EmgResult<Vec<_>>>()?;
            classes.push(mapped);
        }
        GestureSet::new(classes)
    }
}

/// Channels a feature vector is built from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelSelection {
    #[default]
    All,
    /// Explicit channel indices, in feature order
    Subset(Vec<usize>),
}

impl ChannelSelection {
    /// Concrete indices for a trial with `n_channels` columns
    pub fn indices(&self, n_channels: usize) -> EmgResult<Vec<usize>> {
        match self {
            ChannelSelection::All => Ok((0..n_channels).collect()),
            ChannelSelection::Subset(channels) => {
                if let Some((i, &duplicate)) =
                    channels.iter().enumerate().find(|&(i, c)| channels[..i].contains(c))
                {
                    return Err(EmgErrorBuilder::new("channel_selection", "indices").invalid_data(
                        "channel index",
                        format!("duplicate channel index {} at position {}", duplicate, i),
                    ));
                }
                if let Some(&bad) = channels.iter().find(|&&c| c >= n_channels) {
                    return Err(EmgErrorBuilder::new("channel_selection", "indices").mismatch(
                        "channel index",
                        "out of range",
                        format!("< {}", n_channels),
                        bad,
                    ));
                }
                Ok(channels.clone())
            }
        }
    }
}
