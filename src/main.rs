use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use harvest_allocation::simulation::batch::{run_batch, RunStatus};
use harvest_allocation::simulation::config::ScenarioConfig;
use harvest_allocation::simulation::runner::{check_scenario, run_scenario};

/// Harvest Allocation Tool: synthesizes harvest events to meet wood demand
#[derive(Parser, Debug)]
#[command(name = "hat")]
#[command(about = "Allocates harvest to meet industrial roundwood and fuelwood demand", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one scenario and write its events and diagnostics
    Run {
        /// Scenario YAML file
        config: PathBuf,
    },
    /// Simulate several scenarios in parallel
    Batch {
        /// Scenario YAML files
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Worker threads (defaults to the number of cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Validate the input tables of a scenario without simulating
    Check {
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => {
            let result = ScenarioConfig::from_file(&config).and_then(|c| run_scenario(&c));
            match result {
                Ok(summary) => {
                    println!(
                        "{}: {} events over {} years written to {}",
                        summary.label,
                        summary.events,
                        summary.allocated_years,
                        summary.output_dir.display()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "run failed");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Batch { configs, threads } => match run_batch(&configs, threads) {
            Ok(outcomes) => {
                let mut failed = false;
                for outcome in &outcomes {
                    match &outcome.status {
                        RunStatus::Completed(summary) => {
                            println!("ok      {} ({} events)", summary.label, summary.events)
                        }
                        RunStatus::Failed(message) => {
                            failed = true;
                            println!("FAILED  {}: {}", outcome.config.display(), message);
                        }
                    }
                }
                if failed {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(e) => {
                error!(error = %e, "batch could not start");
                ExitCode::FAILURE
            }
        },
        Command::Check { config } => {
            match ScenarioConfig::from_file(&config).and_then(|c| check_scenario(&c)) {
                Ok(inputs) => {
                    println!(
                        "inputs are consistent: {} event templates, {} classifiers",
                        inputs.templates.all().map(Vec::len).sum::<usize>(),
                        inputs.classifiers.len()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "inputs are invalid");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
