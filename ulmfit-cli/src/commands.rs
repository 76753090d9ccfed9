//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use ulmfit_core::params::RunParams;
use ulmfit_core::scenario::ScenarioContext;
use ulmfit_core::training::{ExperimentReport, ExperimentRunner, TrialStatus};
use ulmfit_core::{Settings, load_params};

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    settings: &Settings,
) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            params,
            seeds,
            output,
            name,
        } => handle_run(&params, &seeds, output, name.as_deref(), workspace, settings),
        Commands::Schedule { params } => handle_schedule(&params, settings),
        Commands::List => handle_list(settings),
        Commands::Defaults { kind, name } => handle_defaults(&kind, &name, settings),
        Commands::Config { action } => handle_config(action, workspace, settings),
    }
}

fn handle_run(
    params_path: &Path,
    seeds: &[u64],
    output: Option<PathBuf>,
    name: Option<&str>,
    workspace: &Path,
    settings: &Settings,
) -> anyhow::Result<()> {
    let params = load_params(params_path)?;
    let ctx = ScenarioContext::with_reference_learner(settings)?;

    if seeds.len() <= 1 && output.is_none() {
        let params = match seeds.first() {
            Some(&seed) => RunParams::with_seed(&params, seed),
            None => params,
        };
        let result = ctx.run(&params)?;
        println!("{}", serde_json::to_string_pretty(&result.summary())?);
        return Ok(());
    }

    let report = ExperimentRunner::new(&ctx).run(name, &params, seeds)?;
    print_report(&report);

    let path = output.unwrap_or_else(|| {
        workspace
            .join(&settings.experiment.output_dir)
            .join(report.file_name())
    });
    report.save(&path)?;
    info!(path = %path.display(), "Saved experiment report");
    println!("Report written to: {}", path.display());

    if report.failed() > 0 {
        warn!(failed = report.failed(), "Some trials failed");
    }
    if report.completed() == 0 {
        anyhow::bail!("all {} trials failed", report.trials.len());
    }
    Ok(())
}

fn print_report(report: &ExperimentReport) {
    println!("Experiment {} ({})", report.name, report.id);
    for trial in &report.trials {
        match (&trial.status, trial.metric) {
            (TrialStatus::Completed, Some(metric)) => {
                println!("  seed {:>6}  {:.4}  ({:.1}s)", trial.seed, metric, trial.duration_secs)
            }
            _ => println!(
                "  seed {:>6}  failed: {}",
                trial.seed,
                trial.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    if let Some(summary) = &report.summary {
        println!(
            "  mean {:.4} ± {:.4} over {} trials (min {:.4}, max {:.4})",
            summary.mean, summary.std_dev, summary.count, summary.min, summary.max
        );
    }
}

fn handle_schedule(params_path: &Path, settings: &Settings) -> anyhow::Result<()> {
    let params = RunParams::from_value(&load_params(params_path)?)?;
    let ctx = ScenarioContext::with_reference_learner(settings)?;
    let schedule = ctx
        .schedules()
        .create_from_config(&params.training_schedule)?;
    let phases = schedule.generate();
    println!("{} ({} phases)", schedule.name(), phases.len());
    println!("{}", serde_json::to_string_pretty(&phases)?);
    Ok(())
}

fn handle_list(settings: &Settings) -> anyhow::Result<()> {
    let ctx = ScenarioContext::with_reference_learner(settings)?;

    println!("Scenarios:");
    for entry in ctx.scenarios().entries() {
        println!("  {:<20} {}", entry.name, entry.description);
    }
    println!("Datasets:");
    for entry in ctx.datasets().entries() {
        println!("  {:<20} {}", entry.name, entry.description);
    }
    println!("Training schedules:");
    for entry in ctx.schedules().entries() {
        println!("  {:<20} {}", entry.name, entry.description);
    }
    Ok(())
}

fn handle_defaults(kind: &str, name: &str, settings: &Settings) -> anyhow::Result<()> {
    let defaults = variant_defaults(kind, name, settings)?;
    println!("{}", serde_json::to_string_pretty(&defaults)?);
    Ok(())
}

fn variant_defaults(
    kind: &str,
    name: &str,
    settings: &Settings,
) -> anyhow::Result<serde_json::Value> {
    let ctx = ScenarioContext::with_reference_learner(settings)?;
    let defaults = match kind {
        "scenario" => ctx.scenarios().get_default_config(name)?,
        "dataset" => ctx.datasets().get_default_config(name)?,
        "schedule" | "training_schedule" => ctx.schedules().get_default_config(name)?,
        other => anyhow::bail!(
            "Unknown registry kind: '{}' (expected scenario, dataset or schedule)",
            other
        ),
    };
    Ok(defaults)
}

fn handle_config(action: ConfigAction, workspace: &Path, settings: &Settings) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".ulmfit");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&Settings::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(settings)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
