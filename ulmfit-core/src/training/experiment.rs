//! Experiment tracking: repeats a scenario over several seeds and records
//! one trial per seed.

use crate::error::ScenarioError;
use crate::params::RunParams;
use crate::scenario::ScenarioContext;
use crate::training::reproducibility::{EnvironmentSnapshot, fingerprint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Completed,
    Failed,
}

/// One seeded run of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub seed: u64,
    pub status: TrialStatus,
    pub metric: Option<f64>,
    /// Per-phase training losses; empty for failed trials.
    pub train_losses: Vec<Vec<f64>>,
    pub duration_secs: f64,
    pub error: Option<String>,
}

/// Aggregate of the metric over completed trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricSummary {
    /// `None` when no trial completed.
    pub fn from_trials(trials: &[TrialRecord]) -> Option<Self> {
        let values: Vec<f64> = trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .filter_map(|t| t.metric)
            .collect();
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        Some(Self {
            count,
            mean,
            std_dev: variance.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// A multi-seed experiment and its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub id: String,
    pub name: String,
    pub scenario: String,
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the parameters without the seed.
    pub params_fingerprint: String,
    pub params: Value,
    pub environment: EnvironmentSnapshot,
    pub trials: Vec<TrialRecord>,
    pub summary: Option<MetricSummary>,
}

impl ExperimentReport {
    pub fn completed(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.trials.len() - self.completed()
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the report as pretty JSON, replacing any existing file atomically.
    pub fn save(&self, path: &Path) -> Result<(), ScenarioError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Default file name inside an output directory.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.name, self.id)
    }
}

/// Runs a scenario once per seed against a shared context.
pub struct ExperimentRunner<'a> {
    ctx: &'a ScenarioContext,
}

impl<'a> ExperimentRunner<'a> {
    pub fn new(ctx: &'a ScenarioContext) -> Self {
        Self { ctx }
    }

    /// Run `params` once for each seed.
    ///
    /// The parameters are validated once before any trial; a trial that fails
    /// afterwards is recorded as [`TrialStatus::Failed`] and the remaining
    /// seeds still run. An empty `seeds` list runs the seed in `params`.
    pub fn run(
        &self,
        name: Option<&str>,
        params: &Value,
        seeds: &[u64],
    ) -> Result<ExperimentReport, ScenarioError> {
        let run_params = RunParams::from_value(params)?;
        let scenario = run_params
            .scenario_name()
            .ok_or_else(|| ScenarioError::config("missing required key `scenario.name`"))?
            .to_string();
        if !self.ctx.scenarios().contains(&scenario) {
            return Err(ScenarioError::unknown_variant(
                self.ctx.scenarios().kind(),
                &scenario,
            ));
        }

        let seeds = if seeds.is_empty() {
            vec![run_params.seed]
        } else {
            seeds.to_vec()
        };
        let mut unseeded = params.clone();
        if let Some(map) = unseeded.as_object_mut() {
            map.remove("seed");
        }
        let id = uuid::Uuid::new_v4().to_string();
        let name = name.unwrap_or(scenario.as_str()).to_string();
        info!(experiment = %name, id = %id, trials = seeds.len(), "Starting experiment");

        let trials = seeds
            .iter()
            .map(|&seed| self.trial(&scenario, params, seed))
            .collect::<Vec<_>>();
        let summary = MetricSummary::from_trials(&trials);
        if let Some(s) = &summary {
            info!(
                experiment = %name,
                completed = s.count,
                mean = s.mean,
                std_dev = s.std_dev,
                "Experiment finished"
            );
        } else {
            warn!(experiment = %name, "No trial completed");
        }

        Ok(ExperimentReport {
            id,
            name,
            scenario,
            created_at: Utc::now(),
            params_fingerprint: fingerprint(&unseeded),
            params: unseeded,
            environment: EnvironmentSnapshot::capture(),
            trials,
            summary,
        })
    }

    fn trial(&self, scenario: &str, params: &Value, seed: u64) -> TrialRecord {
        let seeded = RunParams::with_seed(params, seed);
        let started = Instant::now();
        let outcome = self.ctx.run_variant(scenario, &seeded);
        let duration_secs = started.elapsed().as_secs_f64();

        match outcome {
            Ok(result) => TrialRecord {
                seed,
                status: TrialStatus::Completed,
                metric: Some(result.metric),
                train_losses: result.stats.train_losses,
                duration_secs,
                error: None,
            },
            Err(e) => {
                warn!(seed, error = %e, "Trial failed");
                TrialRecord {
                    seed,
                    status: TrialStatus::Failed,
                    metric: None,
                    train_losses: Vec::new(),
                    duration_secs,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
