//! Config Registry: named, configurable variants of a component.
//!
//! Each registry maps a variant name to its default configuration and a
//! factory. Variants are registered explicitly at start-up (see the
//! `register` functions in `data`, `training` and `scenario`); after that the
//! registry is only read. Creating a variant deep-merges the caller's
//! configuration over the declared defaults before the factory runs.

use crate::error::ScenarioError;
use crate::params::{deep_merge, empty_config};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Builds a variant from its fully merged configuration.
pub type Factory<T> = fn(&Value) -> Result<Box<T>, ScenarioError>;

/// A registered variant.
pub struct RegistryEntry<T: ?Sized> {
    pub name: String,
    pub description: String,
    pub defaults: Value,
    factory: Factory<T>,
}

impl<T: ?Sized> RegistryEntry<T> {
    fn build(&self, config: &Value) -> Result<Box<T>, ScenarioError> {
        (self.factory)(config)
    }
}

/// Name → variant lookup for one kind of configurable component.
pub struct ConfigRegistry<T: ?Sized> {
    kind: &'static str,
    entries: BTreeMap<String, RegistryEntry<T>>,
}

impl<T: ?Sized> ConfigRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// The kind of component this registry holds (e.g. `"dataset"`).
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register a variant. Returns error if the name is already taken.
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        defaults: Value,
        factory: Factory<T>,
    ) -> Result<(), ScenarioError> {
        if self.entries.contains_key(name) {
            return Err(ScenarioError::duplicate_name(self.kind, name));
        }
        if !defaults.is_object() {
            return Err(ScenarioError::config(format!(
                "defaults for {} variant '{name}' must be a mapping",
                self.kind
            )));
        }
        debug!(kind = self.kind, variant = %name, "Registering variant");
        self.entries.insert(
            name.to_string(),
            RegistryEntry {
                name: name.to_string(),
                description: description.to_string(),
                defaults,
                factory,
            },
        );
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&RegistryEntry<T>, ScenarioError> {
        self.entries
            .get(name)
            .ok_or_else(|| ScenarioError::unknown_variant(self.kind, name))
    }

    /// Declared defaults of a variant (an empty mapping when none were declared).
    pub fn get_default_config(&self, name: &str) -> Result<Value, ScenarioError> {
        Ok(self.entry(name)?.defaults.clone())
    }

    /// Build a variant from `config` merged over its defaults.
    pub fn create(&self, name: &str, config: &Value) -> Result<Box<T>, ScenarioError> {
        let entry = self.entry(name)?;
        let merged = match config {
            Value::Null => entry.defaults.clone(),
            _ => deep_merge(&entry.defaults, config),
        };
        debug!(kind = self.kind, variant = %name, "Creating variant");
        entry.build(&merged)
    }

    /// Build a variant whose name is given by the `name` key of `config`.
    pub fn create_from_config(&self, config: &Value) -> Result<Box<T>, ScenarioError> {
        let name = config
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ScenarioError::config(format!("{} configuration requires a `name`", self.kind))
            })?;
        let mut overrides = config.clone();
        if let Some(map) = overrides.as_object_mut() {
            map.remove("name");
        }
        self.create(name, &overrides)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered variant names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Registered entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry<T>> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> std::fmt::Debug for ConfigRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("kind", &self.kind)
            .field("variants", &self.names())
            .finish()
    }
}

/// Shorthand for variants that declare no defaults.
pub fn no_defaults() -> Value {
    empty_config()
}
