// src/ranking/energy_ratio.rs
//! Consensus ranking of per-class channel energy

use super::{ChannelRanker, RankedChannels};
use crate::dataset::GestureSet;
use crate::error::EmgResult;
use crate::processing::baseline::{aggregate_rest, RestBaseline};
use crate::utils::{argsort_ascending, column_rms};
use ndarray::Array1;
use rayon::prelude::*;
use tracing::debug;

/// Votes on a channel order from every class's mean baseline-normalised RMS
#[derive(Debug, Clone)]
pub struct EnergyRatioRanker {
    epsilon: f64,
}

impl EnergyRatioRanker {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    /// Ascending channel order of one class
    fn class_ranking(&self, trials: &[ndarray::Array2<f64>], baseline: &RestBaseline) -> EmgResult<Vec<usize>> {
        let mut energy = Array1::<f64>::zeros(baseline.n_channels());
        for trial in trials {
            let normalized = baseline.normalize(trial.view(), self.epsilon)?;
            energy += &column_rms(normalized.view());
        }
        energy /= trials.len().max(1) as f64;

        Ok(argsort_ascending(&energy.to_vec()))
    }
}

impl Default for EnergyRatioRanker {
    fn default() -> Self {
        Self::new(crate::config::constants::ranking::NORMALIZATION_EPSILON)
    }
}

impl ChannelRanker for EnergyRatioRanker {
    fn name(&self) -> &'static str {
        "RMS"
    }

    fn rank(&self, gestures: &GestureSet) -> EmgResult<RankedChannels> {
        let baseline = aggregate_rest(gestures.rest())?;

        let rankings = gestures
            .classes()
            .par_iter()
            .map(|trials| self.class_ranking(trials, &baseline))
            .collect::<EmgResult<Vec<_>>>()?;
        debug!(classes = rankings.len(), "per-class energy rankings computed");

        Ok(RankedChannels::new(consensus(&rankings)))
    }
}

/// Order the channels common to every ranking by their most frequent position
///
/// A channel's position is the index at which it occurs most often across the
/// rankings; ties go to the position met first in ranking order. Channels are
/// visited in ascending index order and sorted stably by that position.
pub fn consensus(rankings: &[Vec<usize>]) -> Vec<usize> {
    let Some(first) = rankings.first() else {
        return Vec::new();
    };

    let mut candidates = first.clone();
    candidates.sort_unstable();
    candidates.dedup();

    let mut voted: Vec<(usize, usize)> = Vec::with_capacity(candidates.len());
    for channel in candidates {
        let positions: Option<Vec<usize>> = rankings
            .iter()
            .map(|ranking| ranking.iter().position(|&c| c == channel))
            .collect();
        // Channels missing from any ranking are dropped
        let Some(positions) = positions else {
            continue;
        };

        let mut counts: Vec<(usize, usize)> = Vec::new();
        for p in positions {
            match counts.iter_mut().find(|(pos, _)| *pos == p) {
                Some((_, count)) => *count += 1,
                None => counts.push((p, 1)),
            }
        }
        let mut modal = counts[0];
        for &entry in &counts[1..] {
            if entry.1 > modal.1 {
                modal = entry;
            }
        }
        voted.push((channel, modal.0));
    }

    voted.sort_by_key(|&(_, position)| position);
    voted.into_iter().map(|(channel, _)| channel).collect()
}
