//! ulmfit CLI: runs fine-tuning scenarios from parameter files.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// ulmfit: reproducible text-classifier fine-tuning scenarios
#[derive(Parser, Debug)]
#[command(name = "ulmfit", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a scenario once, or once per seed
    Run {
        /// Parameter file (JSON or TOML)
        params: PathBuf,
        /// Seeds to run; repeat for a multi-seed experiment
        #[arg(short, long = "seed")]
        seeds: Vec<u64>,
        /// Write the experiment report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Experiment name used in the report
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print the phases a parameter file's schedule expands to
    Schedule {
        /// Parameter file (JSON or TOML)
        params: PathBuf,
    },
    /// List registered scenarios, datasets and schedules
    List,
    /// Print the default configuration of a registered variant
    Defaults {
        /// Registry kind: scenario, dataset or schedule
        kind: String,
        /// Variant name
        name: String,
    },
    /// Manage settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default workspace settings file
    Init,
    /// Show the resolved settings
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let settings = ulmfit_core::load_settings(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (always active)
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let mut _guard = None;
    let json_layer = if settings.logging.json_file {
        let log_dir = ulmfit_core::config::project_dirs()
            .map(|d| d.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("."));
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "ulmfit.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(&settings.logging.file_filter)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, &workspace, &settings)
}
