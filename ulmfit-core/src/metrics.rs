//! Classification metrics and the evaluator handle scenarios call.

use crate::error::ScenarioError;
use crate::learner::Predictions;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Computes a scalar score from predictions.
pub type Evaluator = Arc<dyn Fn(&Predictions) -> Result<f64, ScenarioError> + Send + Sync>;

/// Built-in classification metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    ErrorRate,
    MacroF1,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::ErrorRate => "error_rate",
            Self::MacroF1 => "macro_f1",
        }
    }

    pub fn compute(&self, preds: &Predictions) -> Result<f64, ScenarioError> {
        match self {
            Self::Accuracy => accuracy(preds),
            Self::ErrorRate => error_rate(preds),
            Self::MacroF1 => macro_f1(preds),
        }
    }

    pub fn evaluator(self) -> Evaluator {
        Arc::new(move |preds| self.compute(preds))
    }
}

impl FromStr for Metric {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(Self::Accuracy),
            "error_rate" => Ok(Self::ErrorRate),
            "macro_f1" => Ok(Self::MacroF1),
            other => Err(ScenarioError::config(format!("unknown metric '{other}'"))),
        }
    }
}

fn check(preds: &Predictions) -> Result<(), ScenarioError> {
    if preds.is_empty() {
        return Err(ScenarioError::evaluation("no predictions to evaluate"));
    }
    if preds.scores.len() != preds.labels.len() {
        return Err(ScenarioError::evaluation(format!(
            "{} score rows for {} labels",
            preds.scores.len(),
            preds.labels.len()
        )));
    }
    Ok(())
}

/// Fraction of examples whose highest-scoring class is the true label.
pub fn accuracy(preds: &Predictions) -> Result<f64, ScenarioError> {
    check(preds)?;
    let correct = preds
        .argmax()
        .iter()
        .zip(&preds.labels)
        .filter(|(p, l)| p == l)
        .count();
    Ok(correct as f64 / preds.len() as f64)
}

pub fn error_rate(preds: &Predictions) -> Result<f64, ScenarioError> {
    Ok(1.0 - accuracy(preds)?)
}

/// Unweighted mean of per-class F1 over every class that occurs in the
/// labels or the predictions.
pub fn macro_f1(preds: &Predictions) -> Result<f64, ScenarioError> {
    check(preds)?;
    let predicted = preds.argmax();
    let classes = predicted
        .iter()
        .chain(&preds.labels)
        .copied()
        .max()
        .map_or(0, |m| m + 1);

    let mut tp = vec![0usize; classes];
    let mut fp = vec![0usize; classes];
    let mut fn_ = vec![0usize; classes];
    for (&p, &l) in predicted.iter().zip(&preds.labels) {
        if p == l {
            tp[p] += 1;
        } else {
            fp[p] += 1;
            fn_[l] += 1;
        }
    }

    let mut total = 0.0;
    let mut present = 0usize;
    for c in 0..classes {
        let support = tp[c] + fp[c] + fn_[c];
        if support == 0 {
            continue;
        }
        present += 1;
        total += 2.0 * tp[c] as f64 / (2 * tp[c] + fp[c] + fn_[c]) as f64;
    }
    Ok(total / present as f64)
}
