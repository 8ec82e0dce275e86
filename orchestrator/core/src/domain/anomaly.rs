// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Anomaly Scoring
//!
//! Rolling-window health model over per-execution feature vectors. Each
//! finished execution contributes one [`FeatureVector`]; a new vector is scored
//! as the largest absolute z-score of any feature against the window.
//!
//! The scorer is a plain value: callers own the synchronisation.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Lower bound applied to a feature's standard deviation, so a constant
/// history does not turn the first deviation into an infinite score.
const MIN_STD_DEV: f64 = 1e-3;

/// Fixed-size numeric feature tuple.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub cpu: f64,
    pub memory: f64,
    pub response_time: f64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub throughput: f64,
}

impl FeatureVector {
    pub const LEN: usize = 6;

    pub fn as_array(&self) -> [f64; Self::LEN] {
        [
            self.cpu,
            self.memory,
            self.response_time,
            self.error_rate,
            self.success_rate,
            self.throughput,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub score: f64,
    pub is_anomaly: bool,
    pub samples: usize,
}

#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    window: VecDeque<FeatureVector>,
    capacity: usize,
    threshold: f64,
    min_samples: usize,
}

impl AnomalyScorer {
    pub fn new(capacity: usize, threshold: f64, min_samples: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            threshold,
            min_samples,
        }
    }

    /// Add a vector to the training window, evicting the oldest when full.
    pub fn observe(&mut self, features: FeatureVector) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(features);
    }

    /// Score `features` against the current window without recording it.
    pub fn score(&self, features: &FeatureVector) -> AnomalyScore {
        let samples = self.window.len();
        if samples == 0 {
            return AnomalyScore {
                score: 0.0,
                is_anomaly: false,
                samples,
            };
        }

        let n = samples as f64;
        let mut sums = [0.0; FeatureVector::LEN];
        for v in &self.window {
            for (sum, x) in sums.iter_mut().zip(v.as_array()) {
                *sum += x;
            }
        }
        let means = sums.map(|s| s / n);

        let mut sq = [0.0; FeatureVector::LEN];
        for v in &self.window {
            for ((acc, x), mean) in sq.iter_mut().zip(v.as_array()).zip(means) {
                *acc += (x - mean).powi(2);
            }
        }

        let score = features
            .as_array()
            .iter()
            .zip(means)
            .zip(sq)
            .map(|((x, mean), acc)| {
                let std = (acc / n).sqrt().max(MIN_STD_DEV);
                ((x - mean) / std).abs()
            })
            .fold(0.0_f64, f64::max);

        AnomalyScore {
            score,
            is_anomaly: samples >= self.min_samples && score > self.threshold,
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}
