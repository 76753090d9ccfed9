//! # ulmfit-core: fine-tuning scenarios for text classifiers
//!
//! A scenario takes a nested parameter dictionary, builds a dataset provider
//! and a training schedule from named registries, fine-tunes a learner phase
//! by phase and reports a held-out metric together with the per-phase losses.
//!
//! ## Layout
//!
//! - [`registry`] maps variant names to default configurations and factories
//! - [`params`] validates run parameters and deep-merges configurations
//! - [`data`] provides labelled text and seed-keyed training samples
//! - [`training`] holds phases, schedules, one-cycle annealing, seeding and
//!   multi-seed experiments
//! - [`learner`] defines the learner seam and a reference bag-of-words learner
//! - [`scenario`] ties the pieces into a single run

// Foundation
pub mod config;
pub mod error;
pub mod params;
pub mod registry;

// Components
pub mod data;
pub mod learner;
pub mod metrics;
pub mod training;

// Runs
pub mod scenario;

// Re-exports
pub use config::{Settings, load_settings};
pub use error::ScenarioError;
pub use params::{RunParams, deep_merge, load_params};
pub use registry::ConfigRegistry;
pub use scenario::{RunStats, Scenario, ScenarioContext, ScenarioResult};
pub use training::{ExperimentReport, ExperimentRunner};
