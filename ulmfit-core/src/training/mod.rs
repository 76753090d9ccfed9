//! Training infrastructure: phases, schedules, one-cycle annealing,
//! experiment tracking and reproducibility.

pub mod experiment;
pub mod one_cycle;
pub mod phase;
pub mod reproducibility;
pub mod schedule;

pub use experiment::{ExperimentReport, ExperimentRunner, MetricSummary, TrialRecord, TrialStatus};
pub use one_cycle::OneCyclePlan;
pub use phase::{LrPolicy, OneCycle, TrainingPhase};
pub use reproducibility::{EnvironmentSnapshot, SeedManager};
pub use schedule::{ScheduleRegistry, TrainingSchedule};
