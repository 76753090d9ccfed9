//! Error types for the ulmfit-core crate.

use thiserror::Error;

/// Top-level error type for scenario runs.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown {kind} variant: {name}")]
    UnknownVariant { kind: String, name: String },

    #[error("Duplicate {kind} variant: {name}")]
    DuplicateName { kind: String, name: String },

    #[error("Failed to load encoder '{name}': {reason}")]
    EncoderLoad { name: String, reason: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ScenarioError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unknown_variant(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn duplicate_name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn encoder_load(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EncoderLoad {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}
