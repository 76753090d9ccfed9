//! Data providers: seeded training samples and held-out evaluation sets.

use crate::data::bunch::{DataBunch, Example};
use crate::data::source::{LabeledText, TextSource};
use crate::error::ScenarioError;
use crate::registry::ConfigRegistry;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Registry of dataset variants.
pub type DatasetRegistry = ConfigRegistry<dyn DataProvider>;

/// Supplies the data a scenario trains and evaluates on.
pub trait DataProvider: Send + Sync {
    /// A fixed-size training sample keyed by `seed`, with its own
    /// training-time validation split.
    fn get_training_sample(&self, seed: u64) -> Result<DataBunch, ScenarioError>;

    /// The whole training set, shuffled by `seed` and split for validation.
    fn get_full_training(&self, seed: u64) -> Result<DataBunch, ScenarioError>;

    /// The full held-out test set exposed as the validation split.
    fn get_test_as_valid(&self) -> Result<DataBunch, ScenarioError>;
}

#[derive(Debug, Clone, Deserialize)]
struct TextDatasetConfig {
    train: TextSource,
    test: TextSource,
    sample_size: usize,
    valid_fraction: f64,
}

/// Text classification dataset backed by two [`TextSource`]s.
#[derive(Debug, Clone)]
pub struct TextDataset {
    train: Vec<Example>,
    test: Vec<Example>,
    classes: Vec<String>,
    sample_size: usize,
    valid_fraction: f64,
}

impl TextDataset {
    pub const INLINE: &'static str = "inline";
    pub const JSONL: &'static str = "jsonl";

    pub fn inline_defaults() -> Value {
        json!({
            "train": {"type": "inline", "examples": []},
            "test": {"type": "inline", "examples": []},
            "sample_size": 100,
            "valid_fraction": 0.1,
        })
    }

    pub fn jsonl_defaults() -> Value {
        json!({
            "train": {"type": "jsonl", "path": "data/train.jsonl"},
            "test": {"type": "jsonl", "path": "data/test.jsonl"},
            "sample_size": 100,
            "valid_fraction": 0.1,
        })
    }

    pub fn from_config(config: &Value) -> Result<Box<dyn DataProvider>, ScenarioError> {
        let config: TextDatasetConfig = serde_json::from_value(config.clone())
            .map_err(|e| ScenarioError::config(format!("invalid dataset configuration: {e}")))?;
        if !(0.0..1.0).contains(&config.valid_fraction) {
            return Err(ScenarioError::config(format!(
                "valid_fraction must lie in [0, 1), got {}",
                config.valid_fraction
            )));
        }
        if config.sample_size == 0 {
            return Err(ScenarioError::config("sample_size must be positive"));
        }

        let train = config.train.load()?;
        let test = config.test.load()?;
        info!(
            train = %config.train.location(),
            test = %config.test.location(),
            train_examples = train.len(),
            test_examples = test.len(),
            "Loaded text dataset"
        );
        Ok(Box::new(Self::new(
            train,
            test,
            config.sample_size,
            config.valid_fraction,
        )?))
    }

    pub fn new(
        train: Vec<LabeledText>,
        test: Vec<LabeledText>,
        sample_size: usize,
        valid_fraction: f64,
    ) -> Result<Self, ScenarioError> {
        if train.is_empty() {
            return Err(ScenarioError::dataset("training set is empty"));
        }
        let classes: Vec<String> = train
            .iter()
            .map(|t| t.label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let index = |t: LabeledText| -> Result<Example, ScenarioError> {
            let label = classes
                .binary_search(&t.label)
                .map_err(|_| ScenarioError::dataset(format!("unknown label '{}'", t.label)))?;
            Ok(Example {
                text: t.text,
                label,
            })
        };
        let train = train.into_iter().map(&index).collect::<Result<Vec<_>, _>>()?;
        let test = test.into_iter().map(&index).collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            train,
            test,
            classes,
            sample_size,
            valid_fraction,
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Shuffle the training set with `seed`, keep `take` examples and split
    /// off the validation share from the front.
    fn draw(&self, seed: u64, take: usize) -> DataBunch {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..self.train.len()).collect();
        indices.shuffle(&mut rng);
        indices.truncate(take.min(self.train.len()));

        let valid_count = ((indices.len() as f64) * self.valid_fraction).round() as usize;
        let valid_count = valid_count.min(indices.len().saturating_sub(1));
        let (valid_idx, train_idx) = indices.split_at(valid_count);
        debug!(
            seed,
            train = train_idx.len(),
            valid = valid_idx.len(),
            "Drew training split"
        );

        DataBunch {
            train: train_idx.iter().map(|&i| self.train[i].clone()).collect(),
            valid: valid_idx.iter().map(|&i| self.train[i].clone()).collect(),
            classes: self.classes.clone(),
        }
    }
}

impl DataProvider for TextDataset {
    fn get_training_sample(&self, seed: u64) -> Result<DataBunch, ScenarioError> {
        if self.sample_size > self.train.len() {
            debug!(
                sample_size = self.sample_size,
                available = self.train.len(),
                "Sample size exceeds training set; using all examples"
            );
        }
        Ok(self.draw(seed, self.sample_size))
    }

    fn get_full_training(&self, seed: u64) -> Result<DataBunch, ScenarioError> {
        Ok(self.draw(seed, self.train.len()))
    }

    fn get_test_as_valid(&self) -> Result<DataBunch, ScenarioError> {
        if self.test.is_empty() {
            return Err(ScenarioError::dataset("test set is empty"));
        }
        Ok(DataBunch {
            train: self.train.clone(),
            valid: self.test.clone(),
            classes: self.classes.clone(),
        })
    }
}

/// Register the built-in dataset variants.
pub fn register(registry: &mut DatasetRegistry) -> Result<(), ScenarioError> {
    registry.register(
        TextDataset::INLINE,
        "Examples embedded in the configuration",
        TextDataset::inline_defaults(),
        TextDataset::from_config,
    )?;
    registry.register(
        TextDataset::JSONL,
        "Examples read from JSON Lines files",
        TextDataset::jsonl_defaults(),
        TextDataset::from_config,
    )?;
    Ok(())
}
