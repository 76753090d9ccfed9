//! Learner interfaces: the trainable model a scenario drives through its
//! phases, and the factory that builds it.

pub mod reference;

pub use reference::{BagOfWordsFactory, BagOfWordsLearner};

use crate::data::{DataBunch, Split};
use crate::error::ScenarioError;
use crate::training::phase::OneCycle;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Class scores and true labels for one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    /// One row of class scores per example.
    pub scores: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl Predictions {
    /// Index of the highest score in each row.
    pub fn argmax(&self) -> Vec<usize> {
        self.scores
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &s)| {
                        if s > best.1 { (i, s) } else { best }
                    })
                    .0
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A trainable classifier organised in layer groups.
pub trait Learner: Send {
    /// Load pretrained encoder weights. `Ok(false)` means the encoder exists
    /// but could not be applied.
    fn load_encoder(&mut self, name: &str) -> Result<bool, ScenarioError>;

    /// Number of layer groups the freeze boundary indexes into.
    fn layer_groups(&self) -> usize;

    /// Freeze every group before `boundary`; negative values count from the
    /// end, and values past either end clamp to fully frozen / unfrozen.
    fn freeze_to(&mut self, boundary: i64);

    /// Run one one-cycle fit over the training split.
    fn fit_one_cycle(&mut self, cycle: &OneCycle) -> Result<(), ScenarioError>;

    /// Per-step training losses recorded by the most recent fit.
    fn losses(&self) -> &[f64];

    /// Replace the data the learner trains and predicts on.
    fn set_data(&mut self, data: DataBunch);

    /// Class scores for every example of `split`.
    fn predict(&mut self, split: Split) -> Result<Predictions, ScenarioError>;
}

/// Builds learners for a scenario run.
pub trait LearnerFactory: Send + Sync {
    /// `aggregation` is passed through from the run parameters untouched;
    /// `rng` is the run's seeded model RNG.
    fn build(
        &self,
        data: DataBunch,
        arch: &str,
        aggregation: &serde_json::Value,
        rng: StdRng,
    ) -> Result<Box<dyn Learner>, ScenarioError>;
}

/// Resolve a freeze boundary against `groups` layer groups, returning the
/// number of leading groups to freeze.
pub fn frozen_prefix(boundary: i64, groups: usize) -> usize {
    let groups_i = groups as i64;
    let resolved = if boundary < 0 {
        groups_i + boundary
    } else {
        boundary
    };
    resolved.clamp(0, groups_i) as usize
}
