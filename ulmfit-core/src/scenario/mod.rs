//! Scenarios: named experiment variants that fine-tune a learner through a
//! training schedule and report a metric.
//!
//! Every variant shares the same run algorithm ([`Scenario::single_run`]);
//! variants differ only in how they obtain training data
//! ([`Scenario::training_data`]).

pub mod context;
pub mod variants;

pub use context::{ScenarioContext, ScenarioContextBuilder};
pub use variants::{FullTrainSet, SmallTrainSample};

use crate::data::{DataBunch, DataProvider, Split};
use crate::error::ScenarioError;
use crate::learner::{Learner, frozen_prefix};
use crate::params::RunParams;
use crate::registry::ConfigRegistry;
use crate::training::reproducibility::{MODEL, SAMPLING, SeedManager};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span};

/// Registry of scenario variants.
pub type ScenarioRegistry = ConfigRegistry<dyn Scenario>;

/// Statistics collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Per-step training losses, one entry per schedule phase in order.
    pub train_losses: Vec<Vec<f64>>,
}

/// Outcome of a successful run.
pub struct ScenarioResult {
    pub metric: f64,
    pub stats: RunStats,
    /// The fine-tuned learner, handed over to the caller.
    pub model: Option<Box<dyn Learner>>,
}

impl ScenarioResult {
    /// Serialisable part of the result.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            metric: self.metric,
            stats: self.stats.clone(),
        }
    }
}

impl std::fmt::Debug for ScenarioResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioResult")
            .field("metric", &self.metric)
            .field("stats", &self.stats)
            .field("model", &self.model.as_ref().map(|_| "<learner>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub metric: f64,
    pub stats: RunStats,
}

/// A configurable experiment variant.
pub trait Scenario: Send + Sync {
    /// Registry name of the variant.
    fn name(&self) -> &'static str;

    /// Training data for a run seeded with `seed`.
    fn training_data(
        &self,
        provider: &dyn DataProvider,
        seed: u64,
    ) -> Result<DataBunch, ScenarioError>;

    /// Run the scenario once with the given parameter dictionary.
    ///
    /// Parameters are validated before any data is loaded or any model is
    /// built. A failure at any step aborts the run; losses gathered so far are
    /// dropped with it.
    fn single_run(
        &self,
        ctx: &ScenarioContext,
        params: &Value,
    ) -> Result<ScenarioResult, ScenarioError> {
        let params = RunParams::from_value(params)?;
        execute(self, ctx, &params)
    }
}

fn execute<S: Scenario + ?Sized>(
    scenario: &S,
    ctx: &ScenarioContext,
    params: &RunParams,
) -> Result<ScenarioResult, ScenarioError> {
    let span = info_span!("scenario", name = scenario.name(), seed = params.seed);
    let _enter = span.enter();
    let evaluator = ctx.evaluator_for(params)?;

    let provider = ctx.datasets().create_from_config(&params.dataset)?;

    let mut seeds = SeedManager::new(params.seed);
    let data = scenario.training_data(provider.as_ref(), seeds.get_seed(SAMPLING))?;
    info!(
        train = data.train.len(),
        valid = data.valid.len(),
        classes = data.num_classes(),
        "Prepared training data"
    );

    let model_settings = ctx.model();
    let mut learner = ctx.learners().build(
        data,
        &model_settings.arch,
        &params.aggregation,
        seeds.rng(MODEL),
    )?;
    if !learner.load_encoder(&model_settings.encoder)? {
        return Err(ScenarioError::encoder_load(
            &model_settings.encoder,
            "learner reported the encoder as not loaded",
        ));
    }

    let schedule = ctx
        .schedules()
        .create_from_config(&params.training_schedule)?;
    let phases = schedule.generate();
    let groups = learner.layer_groups();
    info!(
        schedule = schedule.name(),
        phases = phases.len(),
        layer_groups = groups,
        "Starting schedule"
    );

    let mut train_losses = Vec::with_capacity(phases.len());
    for (index, phase) in phases.iter().enumerate() {
        learner.freeze_to(phase.freeze_to);
        learner.fit_one_cycle(&phase.one_cycle())?;
        let losses = learner.losses().to_vec();
        info!(
            phase = index,
            freeze_to = phase.freeze_to,
            frozen_groups = frozen_prefix(phase.freeze_to, groups),
            epochs = phase.epochs,
            steps = losses.len(),
            last_loss = ?losses.last(),
            "Finished phase"
        );
        train_losses.push(losses);
    }

    learner.set_data(provider.get_test_as_valid()?);
    let preds = learner.predict(Split::Valid)?;
    let metric = evaluator(&preds)?;
    info!(metric, examples = preds.len(), "Evaluated on held-out set");

    Ok(ScenarioResult {
        metric,
        stats: RunStats { train_losses },
        model: Some(learner),
    })
}
