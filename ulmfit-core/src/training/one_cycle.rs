//! One-cycle learning-rate and momentum annealing.

use crate::training::phase::OneCycle;

/// Ratio between the starting rate and the final rate of a cycle.
const FINAL_DIV_MULTIPLIER: f64 = 1e4;

/// Cosine interpolation from `start` (at `pct = 0`) to `end` (at `pct = 1`).
pub fn cos_anneal(start: f64, end: f64, pct: f64) -> f64 {
    let cos_out = (std::f64::consts::PI * pct).cos() + 1.0;
    end + (start - end) / 2.0 * cos_out
}

/// Per-step schedule of one `fit_one_cycle` call.
///
/// Rates are expressed as a multiplier of each group's peak rate so that
/// discriminative policies keep their ratios over the whole cycle.
#[derive(Debug, Clone, Copy)]
pub struct OneCyclePlan {
    total_steps: usize,
    warmup_steps: usize,
    div_factor: f64,
    moms: (f64, f64),
}

impl OneCyclePlan {
    pub fn new(cycle: &OneCycle, steps_per_epoch: usize) -> Self {
        let total_steps = cycle.epochs as usize * steps_per_epoch;
        let warmup_steps = (total_steps as f64 * cycle.pct_start).round() as usize;
        Self {
            total_steps,
            warmup_steps: warmup_steps.min(total_steps),
            div_factor: cycle.div_factor,
            moms: cycle.moms,
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Learning-rate multiplier and momentum at `step`.
    pub fn at(&self, step: usize) -> (f64, f64) {
        let start = 1.0 / self.div_factor;
        let end = start / FINAL_DIV_MULTIPLIER;
        let (high_mom, low_mom) = self.moms;

        if step < self.warmup_steps {
            let pct = step as f64 / self.warmup_steps as f64;
            (cos_anneal(start, 1.0, pct), cos_anneal(high_mom, low_mom, pct))
        } else {
            let remaining = (self.total_steps - self.warmup_steps).max(1);
            let pct = (step - self.warmup_steps) as f64 / remaining as f64;
            (cos_anneal(1.0, end, pct), cos_anneal(low_mom, high_mom, pct))
        }
    }
}
