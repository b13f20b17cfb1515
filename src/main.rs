mod config;
mod launch_config;
mod launcher;
mod navision;
mod registry;
mod sequencer;
mod splash;
mod wait;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use launch_config::LaunchConfig;
use sequencer::{LaunchReport, Sequencer, SystemHost};
use wait::CancelToken;

/// Shows a splash screen, prepares the machine and starts an application
/// described by an INI file.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Launch configuration (`.ini`, or `.toml`).
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Quiet by default: the terminal belongs to the splash screen.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // Usage errors exit 1 like every other failure; clap would use 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(cli) {
        Ok(report) => {
            log::info!(
                "handed off to process {:?} with {} warning(s)",
                report.launched_pid,
                report.warnings.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<LaunchReport> {
    let path = cli.config.context("no configuration file given")?;
    let map = config::load(&path)?;
    let launch = LaunchConfig::from_map(&map)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    log::info!(
        "launching {} from {}",
        launch.command_path.display(),
        path.display()
    );

    let report = Sequencer::new(SystemHost::new(), CancelToken::new()).run(&launch)?;
    Ok(report)
}
