// src/processing/segmentation.rs
//! Active-gesture detection by thresholded window energy

use crate::config::SegmentationConfig;
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::utils::column_rms;
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};

/// Sample interval `[start, end)` of the detected gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// No active window was found
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slice the segment out of a `(samples, channels)` trial
    pub fn apply(&self, trial: ArrayView2<f64>) -> Array2<f64> {
        let end = self.end.min(trial.nrows());
        let start = self.start.min(end);
        trial.slice(s![start..end, ..]).to_owned()
    }
}

/// Locates the longest run of above-average energy windows in a trial
#[derive(Debug, Clone)]
pub struct GestureSegmenter {
    window_size: usize,
    median_filter_size: usize,
}

impl GestureSegmenter {
    pub fn new(window_size: usize, median_filter_size: usize) -> EmgResult<Self> {
        if window_size == 0 {
            return Err(EmgErrorBuilder::new("gesture_segmenter", "new")
                .configuration("window size must be positive"));
        }
        if median_filter_size % 2 == 0 {
            return Err(EmgErrorBuilder::new("gesture_segmenter", "new").configuration(format!(
                "median filter size must be odd, got {}",
                median_filter_size
            )));
        }
        Ok(Self {
            window_size,
            median_filter_size,
        })
    }

    pub fn from_config(config: &SegmentationConfig) -> EmgResult<Self> {
        Self::new(config.window_size, config.median_filter_size)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Find the active gesture interval of `trial` relative to the rest energy
    pub fn segment(&self, trial: ArrayView2<f64>, rest_rms: ArrayView1<f64>) -> EmgResult<Segment> {
        let (samples, channels) = trial.dim();
        if rest_rms.len() != channels {
            return Err(EmgErrorBuilder::new("gesture_segmenter", "segment").mismatch(
                "rest baseline",
                "channel count differs from the trial",
                channels,
                rest_rms.len(),
            ));
        }

        let n_windows = samples / self.window_size;
        if n_windows == 0 {
            return Err(EmgErrorBuilder::new("gesture_segmenter", "segment").mismatch(
                "trial",
                "shorter than one segmentation window",
                format!(">= {} samples", self.window_size),
                samples,
            ));
        }

        // (windows, channels) energy above rest
        let mut energy = Array2::<f64>::zeros((n_windows, channels));
        for (w, mut row) in energy.axis_iter_mut(Axis(0)).enumerate() {
            let window = trial.slice(s![w * self.window_size..(w + 1) * self.window_size, ..]);
            row.assign(&(column_rms(window) - &rest_rms));
        }

        for mut column in energy.axis_iter_mut(Axis(1)) {
            let filtered = median_filter(&column.to_vec(), self.median_filter_size);
            for (dst, src) in column.iter_mut().zip(filtered) {
                *dst = src;
            }
        }

        let trace = energy.sum_axis(Axis(1));
        let threshold = trace.mean().unwrap_or(0.0);
        let mut active: Vec<bool> = trace.iter().map(|&e| e > threshold).collect();

        // Bridge single-window dropouts
        for i in 1..active.len().saturating_sub(1) {
            if !active[i] && active[i - 1] && active[i + 1] {
                active[i] = true;
            }
        }

        let (best_start, best_len) = longest_run(&active);
        Ok(Segment {
            start: best_start * self.window_size,
            end: (best_start + best_len) * self.window_size,
        })
    }
}

/// Sliding median with zero padding beyond both edges
pub fn median_filter(values: &[f64], width: usize) -> Vec<f64> {
    let half = width / 2;
    let mut window = Vec::with_capacity(width);
    (0..values.len())
        .map(|i| {
            window.clear();
            for offset in 0..width {
                let idx = (i + offset).checked_sub(half);
                window.push(idx.and_then(|j| values.get(j)).copied().unwrap_or(0.0));
            }
            window.sort_by(|a, b| a.total_cmp(b));
            window[half]
        })
        .collect()
}

/// Start and length of the longest `true` run, earliest on ties
fn longest_run(active: &[bool]) -> (usize, usize) {
    let (mut best_start, mut best_len) = (0, 0);
    let mut current: Option<(usize, usize)> = None;

    for (i, &is_active) in active.iter().enumerate() {
        current = match (is_active, current) {
            (true, Some((start, len))) => Some((start, len + 1)),
            (true, None) => Some((i, 1)),
            (false, run) => {
                if let Some((start, len)) = run {
                    if len > best_len {
                        best_start = start;
                        best_len = len;
                    }
                }
                None
            }
        };
    }
    if let Some((start, len)) = current {
        if len > best_len {
            best_start = start;
            best_len = len;
        }
    }

    (best_start, best_len)
}
