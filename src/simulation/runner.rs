// src/simulation/runner.rs

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::Result;
use crate::io::inputs::{self, HatInputs};
use crate::io::reporting::write_run_outputs;
use crate::io::table::Table;
use crate::model::classifier::{ClassifierCatalog, Classifiers};
use crate::simulation::config::{AllocationMode, ScenarioConfig};
use crate::simulation::engine::{CarbonEngine, HarvestDriver, ScenarioRun};
use crate::simulation::inventory::{InventoryEngine, InventoryState};
use crate::strategy::implementations::{HarvestAllocationTool, PredeterminedOnly};
use crate::strategy::traits::AllocationStrategy;

/// What a finished scenario left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub label: String,
    pub events: usize,
    pub allocated_years: usize,
    pub over_allocations: usize,
    /// Harvestable carbon left at the end of the run, tC.
    pub final_carbon: f64,
    pub output_dir: PathBuf,
}

/// Builds the reference engine and its initial state from the scenario tables.
pub fn load_engine(config: &ScenarioConfig, hat: &HatInputs) -> Result<(InventoryEngine, InventoryState)> {
    let classifiers = Classifiers::new(config.classifiers.iter().cloned());
    let rows = inputs::inventory(&Table::read(&config.resolve(&config.inputs.inventory))?, &classifiers)?;
    let predetermined = inputs::predetermined_events(
        &Table::read(&config.resolve(&config.inputs.events))?,
        &classifiers,
    )?;
    let catalog = ClassifierCatalog::from_rows(&classifiers, rows.iter().map(|r| r.classifiers.as_slice()));
    for event in &predetermined {
        catalog.check_pattern("events", &event.pattern)?;
        hat.proportions.get(event.disturbance_id)?;
    }
    let engine = InventoryEngine::new(
        classifiers,
        config.inventory_start_year,
        hat.proportions.clone(),
        predetermined,
        config.growth.clone(),
    );
    Ok((engine, InventoryState::new(rows)))
}

/// Loads and cross-checks every input without simulating.
pub fn check_scenario(config: &ScenarioConfig) -> Result<HatInputs> {
    let hat = HatInputs::load(config)?;
    let (engine, state) = load_engine(config, &hat)?;
    hat.check_classifiers(&engine.classifier_catalog(&state))?;
    info!(scenario = %config.label(), stands = state.rows.len(), "inputs are consistent");
    Ok(hat)
}

pub fn run_scenario(config: &ScenarioConfig) -> Result<RunSummary> {
    let hat = HatInputs::load(config)?;
    let (engine, state) = load_engine(config, &hat)?;
    hat.check_classifiers(&engine.classifier_catalog(&state))?;
    match config.allocation {
        AllocationMode::Hat => {
            let strategy = HarvestAllocationTool::new(hat, config.hat.clone());
            simulate(config, engine, state, strategy)
        }
        AllocationMode::PredeterminedOnly => simulate(config, engine, state, PredeterminedOnly),
    }
}

/// Runs the scenario and writes its outputs, also when it fails midway.
fn simulate<S: AllocationStrategy>(
    config: &ScenarioConfig,
    engine: InventoryEngine,
    state: InventoryState,
    strategy: S,
) -> Result<RunSummary> {
    let classifiers = Classifiers::new(config.classifiers.iter().cloned());
    let driver = HarvestDriver::new(strategy, config.inventory_start_year, config.hat_start_year);
    let mut run = ScenarioRun::new(engine, driver, config.timesteps);
    let outcome = run.run(state);

    let output_dir = config.output_dir();
    let diagnostics = run.diagnostics();
    let written = write_run_outputs(&output_dir, &classifiers, run.events(), &diagnostics);
    let last = outcome?;
    written?;

    let over_allocations: usize = run.reports().iter().map(|r| r.warnings.len()).sum();
    if over_allocations > 0 {
        warn!(scenario = %config.label(), over_allocations, "demand was over-allocated in some years");
    }
    let summary = RunSummary {
        label: config.label(),
        events: run.events().count(),
        allocated_years: diagnostics.len(),
        over_allocations,
        final_carbon: last.total_carbon(),
        output_dir,
    };
    info!(scenario = %summary.label, events = summary.events, "scenario completed");
    Ok(summary)
}
