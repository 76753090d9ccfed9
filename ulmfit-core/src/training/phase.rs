//! Training phases and their one-cycle fit parameters.

use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};

/// Learning-rate policy applied across the learner's layer groups.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LrPolicy {
    /// The same peak rate for every group.
    Constant { lr: f64 },
    /// Discriminative rates: the last group trains at `max_lr`, each earlier
    /// group at the previous rate divided by `factor`.
    Discriminative { max_lr: f64, factor: f64 },
}

impl LrPolicy {
    /// Peak learning rate of the last (head) group.
    pub fn max_lr(&self) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::Discriminative { max_lr, .. } => *max_lr,
        }
    }

    /// Peak learning rate for each of `groups` layer groups, first group first.
    pub fn group_rates(&self, groups: usize) -> Vec<f64> {
        match self {
            Self::Constant { lr } => vec![*lr; groups],
            Self::Discriminative { max_lr, factor } => (0..groups)
                .map(|g| max_lr / factor.powi((groups - 1 - g) as i32))
                .collect(),
        }
    }

    /// Same policy with every rate multiplied by `scale`.
    pub fn scaled(&self, scale: f64) -> Self {
        match self {
            Self::Constant { lr } => Self::Constant { lr: lr * scale },
            Self::Discriminative { max_lr, factor } => Self::Discriminative {
                max_lr: max_lr * scale,
                factor: *factor,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let peak = self.max_lr();
        if !(peak.is_finite() && peak > 0.0) {
            return Err(ScenarioError::config(format!(
                "learning rate must be positive, got {peak}"
            )));
        }
        if let Self::Discriminative { factor, .. } = self {
            if !(factor.is_finite() && *factor >= 1.0) {
                return Err(ScenarioError::config(format!(
                    "discriminative factor must be >= 1, got {factor}"
                )));
            }
        }
        Ok(())
    }
}

/// Parameters of one `fit_one_cycle` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneCycle {
    pub epochs: u32,
    pub lr: LrPolicy,
    /// Momentum at the start/end of the cycle and at the learning-rate peak.
    pub moms: (f64, f64),
    /// Fraction of steps spent warming up to the peak rate.
    pub pct_start: f64,
    /// Starting rate is `max_lr / div_factor`.
    pub div_factor: f64,
    pub wd: f64,
}

/// One stage of a fine-tuning schedule.
///
/// `freeze_to` is handed to the learner untouched: groups before the boundary
/// stay frozen, negative values count from the end, and a value more negative
/// than the number of groups leaves the whole model trainable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingPhase {
    pub freeze_to: i64,
    pub epochs: u32,
    pub lr: LrPolicy,
    pub moms: (f64, f64),
    pub pct_start: f64,
    pub div_factor: f64,
    pub wd: f64,
}

impl TrainingPhase {
    /// Fit parameters of this phase, without the freeze boundary.
    pub fn one_cycle(&self) -> OneCycle {
        OneCycle {
            epochs: self.epochs,
            lr: self.lr,
            moms: self.moms,
            pct_start: self.pct_start,
            div_factor: self.div_factor,
            wd: self.wd,
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.lr.validate()?;
        if !(0.0..=1.0).contains(&self.pct_start) {
            return Err(ScenarioError::config(format!(
                "pct_start must lie in [0, 1], got {}",
                self.pct_start
            )));
        }
        if !(self.div_factor.is_finite() && self.div_factor >= 1.0) {
            return Err(ScenarioError::config(format!(
                "div_factor must be >= 1, got {}",
                self.div_factor
            )));
        }
        let (m0, m1) = self.moms;
        if !(0.0..1.0).contains(&m0) || !(0.0..1.0).contains(&m1) {
            return Err(ScenarioError::config(format!(
                "momentums must lie in [0, 1), got ({m0}, {m1})"
            )));
        }
        if !(self.wd.is_finite() && self.wd >= 0.0) {
            return Err(ScenarioError::config(format!(
                "weight decay must be non-negative, got {}",
                self.wd
            )));
        }
        Ok(())
    }
}
