//! Built-in scenario variants.

use crate::data::{DataBunch, DataProvider};
use crate::error::ScenarioError;
use crate::registry::no_defaults;
use crate::scenario::{Scenario, ScenarioRegistry};
use serde_json::Value;

/// Fine-tune on a small, seed-keyed sample of the training set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallTrainSample;

impl SmallTrainSample {
    pub const NAME: &'static str = "small_train_sample";

    pub fn from_config(_config: &Value) -> Result<Box<dyn Scenario>, ScenarioError> {
        Ok(Box::new(Self))
    }
}

impl Scenario for SmallTrainSample {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn training_data(
        &self,
        provider: &dyn DataProvider,
        seed: u64,
    ) -> Result<DataBunch, ScenarioError> {
        provider.get_training_sample(seed)
    }
}

/// Fine-tune on the whole training set, shuffled by seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullTrainSet;

impl FullTrainSet {
    pub const NAME: &'static str = "full_train_set";

    pub fn from_config(_config: &Value) -> Result<Box<dyn Scenario>, ScenarioError> {
        Ok(Box::new(Self))
    }
}

impl Scenario for FullTrainSet {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn training_data(
        &self,
        provider: &dyn DataProvider,
        seed: u64,
    ) -> Result<DataBunch, ScenarioError> {
        provider.get_full_training(seed)
    }
}

/// Register the built-in scenario variants.
pub fn register(registry: &mut ScenarioRegistry) -> Result<(), ScenarioError> {
    registry.register(
        SmallTrainSample::NAME,
        "Fine-tune on a fixed-size sample drawn with the run seed",
        no_defaults(),
        SmallTrainSample::from_config,
    )?;
    registry.register(
        FullTrainSet::NAME,
        "Fine-tune on the full training set",
        no_defaults(),
        FullTrainSet::from_config,
    )?;
    Ok(())
}
