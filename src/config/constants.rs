// src/config/constants.rs
//! Pipeline-wide configuration constants

/// Signal conditioning constants
pub mod conditioning {
    pub const DEFAULT_POWERLINE_HZ: f64 = 50.0;
    pub const DEFAULT_NOTCH_Q: f64 = 50.0;
    pub const DEFAULT_BANDPASS_LOW_HZ: f64 = 20.0;
    pub const DEFAULT_BANDPASS_HIGH_HZ: f64 = 450.0;
    pub const DEFAULT_BANDPASS_ORDER: usize = 4;
    pub const MIN_FILTER_ORDER: usize = 1;
    pub const MAX_FILTER_ORDER: usize = 8;
    /// filtfilt pads each edge with this many multiples of the filter length
    pub const FILTFILT_PAD_FACTOR: usize = 3;
}

/// Gesture segmentation constants
pub mod segmentation {
    pub const DEFAULT_WINDOW_SIZE: usize = 150;
    pub const DEFAULT_MEDIAN_FILTER_SIZE: usize = 3;
}

/// Feature extraction constants
pub mod features {
    /// Number of contiguous temporal windows per trial
    pub const FEATURE_WINDOWS: usize = 3;
    pub const RMS_EPSILON: f64 = 1e-8;
}

/// Cross-validation constants
pub mod cross_validation {
    pub const DEFAULT_N_SPLITS: usize = 4;
    pub const MIN_N_SPLITS: usize = 2;
    pub const DEFAULT_SEED: u64 = 42;
}

/// Channel ranking constants
pub mod ranking {
    pub const NORMALIZATION_EPSILON: f64 = 1e-8;
    pub const MI_NEIGHBORS: usize = 3;
    pub const PERMUTATION_REPEATS: usize = 5;
    pub const SHAP_BACKGROUND_SIZE: usize = 50;
    pub const SHAP_MAX_COALITIONS: usize = 512;
}

/// Subset search constants
pub mod search {
    pub const MIN_SUBSET_SIZE: usize = 2;
    pub const MAX_SUBSET_SIZE: usize = 20;
}

/// Dataset constants
pub mod data {
    pub const REST_GESTURE_ID: u32 = 0;
    pub const CUSTOM_DATASET_NUMBER: u32 = 0;
}

/// File system paths and environment conventions
pub mod paths {
    pub const DEFAULT_CONFIG_FILE: &str = "emg-select.toml";
    pub const LOCAL_CONFIG_FILE: &str = "emg-select.local.toml";
    pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
    pub const DEFAULT_DATASETS_DIR: &str = "static/datasets";
    pub const ENV_PREFIX: &str = "EMGSEL_";
}
