//! Run parameters: deep merging of configuration mappings and validation of
//! the nested parameter dictionary a scenario run consumes.

use crate::error::ScenarioError;
use serde_json::{Map, Value};
use std::path::Path;

/// Recursively merge `overrides` over `base`, returning a new value.
///
/// Objects merge key by key at every nesting level; any other override
/// replaces the base value outright. Neither input is modified.
pub fn deep_merge(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                let next = match base_map.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overrides.clone(),
    }
}

/// Empty configuration mapping.
pub fn empty_config() -> Value {
    Value::Object(Map::new())
}

/// Look up a dotted path (`scenario.dataset`) inside a mapping.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

fn require<'a>(value: &'a Value, path: &str) -> Result<&'a Value, ScenarioError> {
    match lookup(value, path) {
        Some(Value::Null) | None => Err(ScenarioError::config(format!(
            "missing required key `{path}`"
        ))),
        Some(found) => Ok(found),
    }
}

fn require_variant<'a>(value: &'a Value, path: &str) -> Result<&'a Value, ScenarioError> {
    let section = require(value, path)?;
    let map = section
        .as_object()
        .ok_or_else(|| ScenarioError::config(format!("`{path}` must be a mapping")))?;
    match map.get("name") {
        Some(Value::String(_)) => Ok(section),
        Some(_) => Err(ScenarioError::config(format!(
            "`{path}.name` must be a string"
        ))),
        None => Err(ScenarioError::config(format!(
            "missing required key `{path}.name`"
        ))),
    }
}

/// Validated view over a scenario parameter dictionary.
///
/// Construction checks every required key up front so a run can fail before
/// touching data, randomness or the model. Unrecognised keys are kept in
/// [`RunParams::raw`] and otherwise ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub seed: u64,
    pub aggregation: Value,
    pub scenario: Value,
    pub dataset: Value,
    pub training_schedule: Value,
    pub metric: Option<String>,
    pub raw: Value,
}

impl RunParams {
    pub fn from_value(params: &Value) -> Result<Self, ScenarioError> {
        if !params.is_object() {
            return Err(ScenarioError::config("run parameters must be a mapping"));
        }

        let seed = require(params, "seed")?
            .as_u64()
            .ok_or_else(|| ScenarioError::config("`seed` must be a non-negative integer"))?;
        let aggregation = require(params, "aggregation")?.clone();
        let scenario = require(params, "scenario")?;
        if !scenario.is_object() {
            return Err(ScenarioError::config("`scenario` must be a mapping"));
        }
        let dataset = require_variant(params, "scenario.dataset")?.clone();
        let training_schedule = require_variant(params, "training_schedule")?.clone();

        let metric = match params.get("metric") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(_) => return Err(ScenarioError::config("`metric` must be a string")),
        };

        Ok(Self {
            seed,
            aggregation,
            scenario: scenario.clone(),
            dataset,
            training_schedule,
            metric,
            raw: params.clone(),
        })
    }

    /// Name of the scenario variant requested by `scenario.name`, if any.
    pub fn scenario_name(&self) -> Option<&str> {
        self.scenario.get("name").and_then(Value::as_str)
    }

    /// Copy of the raw parameters with the seed replaced.
    pub fn with_seed(params: &Value, seed: u64) -> Value {
        deep_merge(params, &serde_json::json!({ "seed": seed }))
    }
}

/// Load a parameter dictionary from a JSON or TOML file.
pub fn load_params(path: &Path) -> Result<Value, ScenarioError> {
    let content = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    let mut params: Value = if is_toml {
        toml::from_str(&content)
            .map_err(|e| ScenarioError::config(format!("{}: {e}", path.display())))?
    } else {
        serde_json::from_str(&content)?
    };
    if let Some(base) = path.parent() {
        resolve_source_paths(&mut params, base);
    }
    Ok(params)
}

/// Anchor relative `path` entries of the dataset's file sources at `base`.
pub fn resolve_source_paths(params: &mut Value, base: &Path) {
    let Some(dataset) = params
        .pointer_mut("/scenario/dataset")
        .and_then(Value::as_object_mut)
    else {
        return;
    };
    for source in dataset.values_mut() {
        let Some(source) = source.as_object_mut() else {
            continue;
        };
        if source.get("type").and_then(Value::as_str) != Some("jsonl") {
            continue;
        }
        if let Some(Value::String(file)) = source.get_mut("path") {
            if Path::new(file.as_str()).is_relative() {
                *file = base.join(file.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}
