//! Training schedules: declarative plans of progressive-unfreezing phases.
//!
//! A schedule stores only its configuration; [`TrainingSchedule::generate`]
//! expands it into phases on every call, so the same instance can be
//! replayed any number of times with identical results.

use crate::error::ScenarioError;
use crate::registry::ConfigRegistry;
use crate::training::phase::{LrPolicy, TrainingPhase};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Registry of schedule strategies.
pub type ScheduleRegistry = ConfigRegistry<dyn TrainingSchedule>;

/// Ordered plan of training phases.
pub trait TrainingSchedule: Send + Sync + std::fmt::Debug {
    /// Registry name of the strategy.
    fn name(&self) -> &'static str;

    /// Expand the schedule into its phases, in execution order.
    fn generate(&self) -> Vec<TrainingPhase>;
}

/// One-cycle settings shared by every phase a strategy emits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleSettings {
    pub moms: (f64, f64),
    pub pct_start: f64,
    pub div_factor: f64,
    pub wd: f64,
}

impl CycleSettings {
    fn phase(&self, freeze_to: i64, epochs: u32, lr: LrPolicy) -> TrainingPhase {
        TrainingPhase {
            freeze_to,
            epochs,
            lr,
            moms: self.moms,
            pct_start: self.pct_start,
            div_factor: self.div_factor,
            wd: self.wd,
        }
    }
}

fn cycle_defaults() -> Value {
    json!({
        "moms": [0.8, 0.7],
        "pct_start": 0.3,
        "div_factor": 25.0,
        "wd": 0.01,
    })
}

fn parse<T: serde::de::DeserializeOwned>(name: &str, config: &Value) -> Result<T, ScenarioError> {
    serde_json::from_value(config.clone())
        .map_err(|e| ScenarioError::config(format!("invalid {name} schedule: {e}")))
}

/// Build a schedule and check every phase it would produce.
fn checked<S: TrainingSchedule + 'static>(
    schedule: S,
) -> Result<Box<dyn TrainingSchedule>, ScenarioError> {
    for (index, phase) in schedule.generate().iter().enumerate() {
        phase.validate().map_err(|e| {
            ScenarioError::config(format!("{} phase {index}: {e}", schedule.name()))
        })?;
    }
    Ok(Box::new(schedule))
}

// ---------------------------------------------------------------------------
// SinglePhase
// ---------------------------------------------------------------------------

/// A single fit at a fixed freeze boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePhase {
    pub freeze_to: i64,
    pub epochs: u32,
    pub lr: LrPolicy,
    #[serde(flatten)]
    pub cycle: CycleSettings,
}

impl SinglePhase {
    pub const NAME: &'static str = "single_phase";

    pub fn default_config() -> Value {
        let mut config = json!({
            "freeze_to": 0,
            "epochs": 1,
            "lr": {"type": "constant", "lr": 0.01},
        });
        merge_cycle_defaults(&mut config);
        config
    }

    pub fn from_config(config: &Value) -> Result<Box<dyn TrainingSchedule>, ScenarioError> {
        checked(parse::<Self>(Self::NAME, config)?)
    }
}

impl TrainingSchedule for SinglePhase {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn generate(&self) -> Vec<TrainingPhase> {
        vec![self.cycle.phase(self.freeze_to, self.epochs, self.lr)]
    }
}

// ---------------------------------------------------------------------------
// GradualUnfreeze
// ---------------------------------------------------------------------------

/// ULMFiT-style gradual unfreezing: phase `i` trains the last `i + 1` layer
/// groups for `epochs[i]` epochs, with the peak rate decaying per phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradualUnfreeze {
    pub epochs: Vec<u32>,
    pub lr: f64,
    pub lr_decay: f64,
    /// Scale rates down group by group; `false` trains every group at the
    /// phase rate.
    pub discriminative: bool,
    /// Rate factor between neighbouring groups (`None` = same rate).
    pub discriminative_factor: Option<f64>,
    /// Make the final phase fully unfrozen regardless of its position.
    pub unfreeze_last: bool,
    #[serde(flatten)]
    pub cycle: CycleSettings,
}

impl GradualUnfreeze {
    pub const NAME: &'static str = "gradual_unfreeze";

    pub fn default_config() -> Value {
        let mut config = json!({
            "epochs": [1, 1, 1],
            "lr": 0.01,
            "lr_decay": 0.5,
            "discriminative": true,
            "discriminative_factor": 2.6,
            "unfreeze_last": false,
        });
        merge_cycle_defaults(&mut config);
        config
    }

    pub fn from_config(config: &Value) -> Result<Box<dyn TrainingSchedule>, ScenarioError> {
        let schedule = parse::<Self>(Self::NAME, config)?;
        if !(schedule.lr_decay.is_finite() && schedule.lr_decay > 0.0) {
            return Err(ScenarioError::config(format!(
                "lr_decay must be positive, got {}",
                schedule.lr_decay
            )));
        }
        checked(schedule)
    }

    fn policy(&self, lr: f64) -> LrPolicy {
        match self.discriminative_factor {
            Some(factor) if self.discriminative => LrPolicy::Discriminative { max_lr: lr, factor },
            _ => LrPolicy::Constant { lr },
        }
    }
}

impl TrainingSchedule for GradualUnfreeze {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn generate(&self) -> Vec<TrainingPhase> {
        let last = self.epochs.len().saturating_sub(1);
        self.epochs
            .iter()
            .enumerate()
            .map(|(i, &epochs)| {
                let freeze_to = if self.unfreeze_last && i == last {
                    0
                } else {
                    -(i as i64 + 1)
                };
                let lr = self.lr * self.lr_decay.powi(i as i32);
                self.cycle.phase(freeze_to, epochs, self.policy(lr))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Custom
// ---------------------------------------------------------------------------

/// Explicit phase list; unset per-phase fields fall back to the schedule level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPhase {
    pub freeze_to: i64,
    pub epochs: u32,
    #[serde(default)]
    pub lr: Option<LrPolicy>,
    #[serde(default)]
    pub moms: Option<(f64, f64)>,
    #[serde(default)]
    pub pct_start: Option<f64>,
    #[serde(default)]
    pub div_factor: Option<f64>,
    #[serde(default)]
    pub wd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Custom {
    pub phases: Vec<CustomPhase>,
    pub lr: LrPolicy,
    #[serde(flatten)]
    pub cycle: CycleSettings,
}

impl Custom {
    pub const NAME: &'static str = "custom";

    pub fn default_config() -> Value {
        let mut config = json!({
            "phases": [],
            "lr": {"type": "constant", "lr": 0.01},
        });
        merge_cycle_defaults(&mut config);
        config
    }

    pub fn from_config(config: &Value) -> Result<Box<dyn TrainingSchedule>, ScenarioError> {
        checked(parse::<Self>(Self::NAME, config)?)
    }
}

impl TrainingSchedule for Custom {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn generate(&self) -> Vec<TrainingPhase> {
        self.phases
            .iter()
            .map(|custom| TrainingPhase {
                freeze_to: custom.freeze_to,
                epochs: custom.epochs,
                lr: custom.lr.unwrap_or(self.lr),
                moms: custom.moms.unwrap_or(self.cycle.moms),
                pct_start: custom.pct_start.unwrap_or(self.cycle.pct_start),
                div_factor: custom.div_factor.unwrap_or(self.cycle.div_factor),
                wd: custom.wd.unwrap_or(self.cycle.wd),
            })
            .collect()
    }
}

fn merge_cycle_defaults(config: &mut Value) {
    if let (Some(map), Value::Object(cycle)) = (config.as_object_mut(), cycle_defaults()) {
        map.extend(cycle);
    }
}

/// Register the built-in schedule strategies.
pub fn register(registry: &mut ScheduleRegistry) -> Result<(), ScenarioError> {
    registry.register(
        SinglePhase::NAME,
        "One fit at a fixed freeze boundary",
        SinglePhase::default_config(),
        SinglePhase::from_config,
    )?;
    registry.register(
        GradualUnfreeze::NAME,
        "Unfreeze one more layer group per phase",
        GradualUnfreeze::default_config(),
        GradualUnfreeze::from_config,
    )?;
    registry.register(
        Custom::NAME,
        "Explicit list of phases",
        Custom::default_config(),
        Custom::from_config,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> ScheduleRegistry {
        let mut registry = ScheduleRegistry::new("training_schedule");
        register(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_builtins_registered() {
        assert_eq!(
            registry().names(),
            vec!["custom", "gradual_unfreeze", "single_phase"]
        );
    }

    #[test]
    fn test_single_phase_defaults() {
        let schedule = registry().create("single_phase", &json!({})).unwrap();
        let phases = schedule.generate();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].freeze_to, 0);
        assert_eq!(phases[0].epochs, 1);
        assert_eq!(phases[0].lr, LrPolicy::Constant { lr: 0.01 });
        assert_eq!(phases[0].moms, (0.8, 0.7));
    }

    #[test]
    fn test_gradual_unfreeze_boundaries() {
        let schedule = registry()
            .create("gradual_unfreeze", &json!({"epochs": [1, 2, 1], "lr_decay": 0.5}))
            .unwrap();
        let phases = schedule.generate();
        let boundaries: Vec<i64> = phases.iter().map(|p| p.freeze_to).collect();
        let epochs: Vec<u32> = phases.iter().map(|p| p.epochs).collect();
        assert_eq!(boundaries, vec![-1, -2, -3]);
        assert_eq!(epochs, vec![1, 2, 1]);
        assert_eq!(phases[1].lr.max_lr(), 0.005);
        assert_eq!(
            phases[2].lr,
            LrPolicy::Discriminative {
                max_lr: 0.0025,
                factor: 2.6
            }
        );
    }

    #[test]
    fn test_gradual_unfreeze_last_phase_unfrozen() {
        let schedule = registry()
            .create(
                "gradual_unfreeze",
                &json!({"epochs": [1, 1], "unfreeze_last": true, "discriminative_factor": null}),
            )
            .unwrap();
        let phases = schedule.generate();
        assert_eq!(phases[0].freeze_to, -1);
        assert_eq!(phases[1].freeze_to, 0);
        assert_eq!(phases[1].lr, LrPolicy::Constant { lr: 0.005 });
    }

    #[test]
    fn test_gradual_unfreeze_discriminative_switch() {
        let schedule = registry()
            .create("gradual_unfreeze", &json!({"epochs": [1, 1], "discriminative": false}))
            .unwrap();
        let rates: Vec<LrPolicy> = schedule.generate().into_iter().map(|p| p.lr).collect();
        assert_eq!(
            rates,
            vec![LrPolicy::Constant { lr: 0.01 }, LrPolicy::Constant { lr: 0.005 }]
        );
    }

    #[test]
    fn test_gradual_unfreeze_from_toml() {
        let config: Value = toml::from_str("epochs = [2, 1]\ndiscriminative = false\n").unwrap();
        let phases = registry()
            .create("gradual_unfreeze", &config)
            .unwrap()
            .generate();
        assert!(phases.iter().all(|p| matches!(p.lr, LrPolicy::Constant { .. })));
    }

    #[test]
    fn test_generate_is_replayable() {
        let schedule = registry()
            .create("gradual_unfreeze", &json!({"epochs": [3, 1, 4, 1]}))
            .unwrap();
        assert_eq!(schedule.generate(), schedule.generate());
    }

    #[test]
    fn test_empty_schedules() {
        let registry = registry();
        let gradual = registry
            .create("gradual_unfreeze", &json!({"epochs": []}))
            .unwrap();
        assert!(gradual.generate().is_empty());
        let custom = registry.create("custom", &json!({})).unwrap();
        assert!(custom.generate().is_empty());
    }

    #[test]
    fn test_custom_phase_fallbacks() {
        let schedule = registry()
            .create(
                "custom",
                &json!({
                    "phases": [
                        {"freeze_to": -1, "epochs": 1},
                        {"freeze_to": -10, "epochs": 2, "lr": {"type": "constant", "lr": 0.001}, "wd": 0.0}
                    ]
                }),
            )
            .unwrap();
        let phases = schedule.generate();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].lr, LrPolicy::Constant { lr: 0.01 });
        assert_eq!(phases[0].wd, 0.01);
        // boundaries beyond the group count pass through untouched
        assert_eq!(phases[1].freeze_to, -10);
        assert_eq!(phases[1].lr.max_lr(), 0.001);
        assert_eq!(phases[1].wd, 0.0);
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.create("gradual_unfreeze", &json!({"epochs": [-1]})),
            Err(ScenarioError::Configuration(_))
        ));
        assert!(matches!(
            registry.create("single_phase", &json!({"pct_start": 2.0})),
            Err(ScenarioError::Configuration(_))
        ));
        assert!(matches!(
            registry.create("gradual_unfreeze", &json!({"lr_decay": 0.0})),
            Err(ScenarioError::Configuration(_))
        ));
    }

    #[test]
    fn test_create_matches_defaults() {
        let registry = registry();
        for name in registry.names() {
            let defaults = registry.get_default_config(&name).unwrap();
            let from_empty = registry.create(&name, &json!({})).unwrap();
            let from_defaults = registry.create(&name, &defaults).unwrap();
            assert_eq!(from_empty.generate(), from_defaults.generate(), "{name}");
        }
    }

    #[test]
    fn test_serialized_config_rebuilds_same_phases() {
        let config = crate::params::deep_merge(
            &GradualUnfreeze::default_config(),
            &json!({"epochs": [2, 1], "unfreeze_last": true, "discriminative_factor": null}),
        );
        let schedule: GradualUnfreeze = serde_json::from_value(config).unwrap();
        let round_trip = serde_json::to_value(&schedule).unwrap();
        let rebuilt = registry().create(GradualUnfreeze::NAME, &round_trip).unwrap();
        assert_eq!(schedule.generate(), rebuilt.generate());
        assert_eq!(rebuilt.generate()[1].lr, LrPolicy::Constant { lr: 0.005 });
    }
}
