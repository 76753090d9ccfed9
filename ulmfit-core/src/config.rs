//! Settings for scenario runs.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment.
//! Settings describe the environment a run happens in (model architecture,
//! encoder, output locations); the experiment itself is described by the
//! run parameter dictionary.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Model construction settings.
    #[serde(default)]
    pub model: ModelSettings,
    /// Experiment output settings.
    #[serde(default)]
    pub experiment: ExperimentSettings,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Model construction settings passed to the learner factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Architecture identifier handed to the learner factory.
    #[serde(default = "default_arch")]
    pub arch: String,
    /// Pretrained encoder loaded before fine-tuning.
    #[serde(default = "default_encoder")]
    pub encoder: String,
    /// Encoders the reference learner can load.
    #[serde(default = "default_encoders")]
    pub encoders: Vec<String>,
    /// Width of the embedding and projection layers.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Number of hashed token buckets.
    #[serde(default = "default_buckets")]
    pub buckets: usize,
    /// Mini-batch size used by `fit_one_cycle`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            encoder: default_encoder(),
            encoders: default_encoders(),
            hidden_size: default_hidden_size(),
            buckets: default_buckets(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_arch() -> String {
    crate::learner::reference::ARCH.to_string()
}

fn default_encoder() -> String {
    "fwd_enc".to_string()
}

fn default_encoders() -> Vec<String> {
    vec![default_encoder()]
}

fn default_hidden_size() -> usize {
    16
}

fn default_buckets() -> usize {
    1024
}

fn default_batch_size() -> usize {
    16
}

/// Experiment output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSettings {
    /// Directory multi-seed reports are written to, relative to the workspace.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".ulmfit/experiments")
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Write JSON logs to the platform data directory.
    #[serde(default = "default_true")]
    pub json_file: bool,
    /// Filter for the JSON file layer.
    #[serde(default = "default_file_filter")]
    pub file_filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            json_file: true,
            file_filter: default_file_filter(),
        }
    }
}

fn default_file_filter() -> String {
    "debug".to_string()
}

fn default_true() -> bool {
    true
}

/// Platform directories for user-level config and logs.
pub fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "ulmfit", "ulmfit")
}

/// Load settings from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `ULMFIT_`, `__` separates levels)
/// 2. Explicit config file
/// 3. Workspace-local config (`.ulmfit/config.toml`)
/// 4. User config (`~/.config/ulmfit/config.toml`)
/// 5. Built-in defaults
pub fn load_settings(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<Settings, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".ulmfit").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // ULMFIT_MODEL__ENCODER, ULMFIT_EXPERIMENT__OUTPUT_DIR, ...
    figment = figment.merge(Env::prefixed("ULMFIT_").split("__"));

    figment.extract().map_err(Box::new)
}
