//! Scenario context: the populated registries and collaborators a run uses.
//!
//! The builder registers every built-in variant once; additional variants
//! can be registered before [`ScenarioContextBuilder::build`]. After that the
//! context is read-only and can be shared between runs.

use crate::config::{ModelSettings, Settings};
use crate::data::provider::{self, DatasetRegistry};
use crate::error::ScenarioError;
use crate::learner::{BagOfWordsFactory, LearnerFactory};
use crate::metrics::{Evaluator, Metric};
use crate::params::RunParams;
use crate::scenario::{ScenarioRegistry, ScenarioResult, variants};
use crate::training::schedule::{self, ScheduleRegistry};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub struct ScenarioContext {
    scenarios: ScenarioRegistry,
    datasets: DatasetRegistry,
    schedules: ScheduleRegistry,
    learners: Arc<dyn LearnerFactory>,
    evaluator: Evaluator,
    model: ModelSettings,
}

impl ScenarioContext {
    pub fn builder(learners: Arc<dyn LearnerFactory>) -> Result<ScenarioContextBuilder, ScenarioError> {
        ScenarioContextBuilder::new(learners)
    }

    /// Context backed by the reference bag-of-words learner.
    pub fn with_reference_learner(settings: &Settings) -> Result<Self, ScenarioError> {
        let factory = Arc::new(BagOfWordsFactory::new(settings.model.clone()));
        Ok(Self::builder(factory)?.model(settings.model.clone()).build())
    }

    pub fn scenarios(&self) -> &ScenarioRegistry {
        &self.scenarios
    }

    pub fn datasets(&self) -> &DatasetRegistry {
        &self.datasets
    }

    pub fn schedules(&self) -> &ScheduleRegistry {
        &self.schedules
    }

    pub fn learners(&self) -> &dyn LearnerFactory {
        self.learners.as_ref()
    }

    pub fn model(&self) -> &ModelSettings {
        &self.model
    }

    /// Evaluator for a run: the metric named in the parameters, or the
    /// context's default.
    pub fn evaluator_for(&self, params: &RunParams) -> Result<Evaluator, ScenarioError> {
        match &params.metric {
            Some(name) => Ok(name.parse::<Metric>()?.evaluator()),
            None => Ok(Arc::clone(&self.evaluator)),
        }
    }

    /// Run the variant named by `params.scenario.name`.
    pub fn run(&self, params: &Value) -> Result<ScenarioResult, ScenarioError> {
        let run_params = RunParams::from_value(params)?;
        let name = run_params
            .scenario_name()
            .ok_or_else(|| ScenarioError::config("missing required key `scenario.name`"))?
            .to_string();
        self.run_variant(&name, params)
    }

    /// Run the variant `name` with `params`.
    pub fn run_variant(&self, name: &str, params: &Value) -> Result<ScenarioResult, ScenarioError> {
        let run_params = RunParams::from_value(params)?;
        let mut config = run_params.scenario.clone();
        if let Some(map) = config.as_object_mut() {
            map.remove("name");
            map.remove("dataset");
        }
        let scenario = self.scenarios.create(name, &config)?;
        info!(scenario = %name, seed = run_params.seed, "Running scenario");
        scenario.single_run(self, params)
    }
}

impl std::fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("scenarios", &self.scenarios)
            .field("datasets", &self.datasets)
            .field("schedules", &self.schedules)
            .field("model", &self.model)
            .finish()
    }
}

/// Populates the registries before a context is sealed.
pub struct ScenarioContextBuilder {
    scenarios: ScenarioRegistry,
    datasets: DatasetRegistry,
    schedules: ScheduleRegistry,
    learners: Arc<dyn LearnerFactory>,
    evaluator: Evaluator,
    model: ModelSettings,
}

impl ScenarioContextBuilder {
    /// Builder with every built-in variant registered.
    pub fn new(learners: Arc<dyn LearnerFactory>) -> Result<Self, ScenarioError> {
        let mut scenarios = ScenarioRegistry::new("scenario");
        let mut datasets = DatasetRegistry::new("dataset");
        let mut schedules = ScheduleRegistry::new("training_schedule");
        variants::register(&mut scenarios)?;
        provider::register(&mut datasets)?;
        schedule::register(&mut schedules)?;
        info!(
            scenarios = scenarios.len(),
            datasets = datasets.len(),
            schedules = schedules.len(),
            "Registered built-in variants"
        );

        Ok(Self {
            scenarios,
            datasets,
            schedules,
            learners,
            evaluator: Metric::Accuracy.evaluator(),
            model: ModelSettings::default(),
        })
    }

    pub fn model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    /// Default evaluator for runs that name no metric.
    pub fn evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn scenarios_mut(&mut self) -> &mut ScenarioRegistry {
        &mut self.scenarios
    }

    pub fn datasets_mut(&mut self) -> &mut DatasetRegistry {
        &mut self.datasets
    }

    pub fn schedules_mut(&mut self) -> &mut ScheduleRegistry {
        &mut self.schedules
    }

    pub fn build(self) -> ScenarioContext {
        ScenarioContext {
            scenarios: self.scenarios,
            datasets: self.datasets,
            schedules: self.schedules,
            learners: self.learners,
            evaluator: self.evaluator,
            model: self.model,
        }
    }
}
