// src/simulation/batch.rs

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::{HatError, Result};
use crate::io::reporting::{create_run_log, write_error_log};
use crate::simulation::config::ScenarioConfig;
use crate::simulation::runner::{run_scenario, RunSummary};

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed(RunSummary),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub config: PathBuf,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed(_))
    }
}

/// Runs independent scenarios in parallel; one failure never stops the others.
pub fn run_batch(configs: &[PathBuf], threads: Option<usize>) -> Result<Vec<RunOutcome>> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n.max(1));
    }
    let pool = builder
        .build()
        .map_err(|e| HatError::Config(format!("cannot start worker pool: {e}")))?;

    let outcomes: Vec<RunOutcome> = pool.install(|| {
        configs
            .par_iter()
            .map(|path| RunOutcome {
                config: path.clone(),
                status: run_isolated(path),
            })
            .collect()
    });
    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!(runs = outcomes.len(), failed, "batch finished");
    Ok(outcomes)
}

/// Each run logs into its own output directory instead of the shared stderr.
fn run_isolated(path: &Path) -> RunStatus {
    let config = match ScenarioConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            error!(config = %path.display(), error = %e, "cannot read scenario");
            return RunStatus::Failed(e.to_string());
        }
    };
    let log = match create_run_log(&config.output_dir()) {
        Ok(file) => file,
        Err(e) => {
            error!(scenario = %config.label(), error = %e, "cannot create the run log");
            return RunStatus::Failed(e.to_string());
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .finish();
    let status = tracing::subscriber::with_default(subscriber, || run_logged(&config));
    if let RunStatus::Failed(message) = &status {
        error!(scenario = %config.label(), error = %message, "scenario failed");
    }
    status
}

fn run_logged(config: &ScenarioConfig) -> RunStatus {
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_scenario(config)));
    let message = match result {
        Ok(Ok(summary)) => return RunStatus::Completed(summary),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "run panicked".to_string()),
    };

    error!(scenario = %config.label(), error = %message, "scenario failed");
    if let Err(e) = write_error_log(&config.output_dir(), &config.label(), &message) {
        error!(scenario = %config.label(), error = %e, "cannot write the error log");
    }
    RunStatus::Failed(message)
}
