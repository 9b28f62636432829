// src/simulation/engine.rs

use tracing::{debug, info};

use crate::error::{HatError, Result};
use crate::model::classifier::ClassifierCatalog;
use crate::model::stand::Stand;
use crate::strategy::materialize::{EventRecord, HarvestEvent};
use crate::strategy::traits::{AllocationStrategy, TimestepContext, TimestepReport, YearDiagnostics};

/// The carbon simulation HAT is plugged into.
///
/// The state is passed by value through every call; the engine never keeps
/// a hidden copy of it.
pub trait CarbonEngine {
    type State: Clone;

    /// Number of stand rows; must not change while HAT acts on a timestep.
    fn row_count(&self, state: &Self::State) -> usize;

    fn classifier_catalog(&self, state: &Self::State) -> ClassifierCatalog;

    fn apply_predetermined(&self, timestep: u32, state: Self::State) -> Result<Self::State>;

    /// Stand snapshot as if the current timestep were completed now.
    fn preview(&self, state: &Self::State) -> Result<Vec<Stand>>;

    fn apply_events(
        &self,
        timestep: u32,
        state: Self::State,
        events: &[HarvestEvent],
    ) -> Result<Self::State>;

    fn end_timestep(&self, timestep: u32, state: Self::State) -> Result<Self::State>;

    /// Runs `timesteps` steps, handing each one to `dynamics` before closing it.
    fn simulate<F>(&self, timesteps: u32, mut state: Self::State, mut dynamics: F) -> Result<Self::State>
    where
        Self: Sized,
        F: FnMut(&Self, u32, Self::State) -> Result<Self::State>,
    {
        for timestep in 1..=timesteps {
            state = dynamics(self, timestep, state)?;
            state = self.end_timestep(timestep, state)?;
        }
        Ok(state)
    }
}

/// Per-timestep callback: predetermined disturbances, then the strategy.
#[derive(Debug)]
pub struct HarvestDriver<S> {
    strategy: S,
    inventory_start_year: i32,
    hat_start_year: i32,
}

impl<S: AllocationStrategy> HarvestDriver<S> {
    pub fn new(strategy: S, inventory_start_year: i32, hat_start_year: i32) -> Self {
        Self {
            strategy,
            inventory_start_year,
            hat_start_year,
        }
    }

    pub fn year_of(&self, timestep: u32) -> i32 {
        self.inventory_start_year + timestep as i32
    }

    pub fn dynamics<E: CarbonEngine>(
        &mut self,
        engine: &E,
        timestep: u32,
        state: E::State,
    ) -> Result<(E::State, Option<TimestepReport>)> {
        let year = self.year_of(timestep);
        let before = engine.row_count(&state);

        // =================================================================
        // PHASE 1: predetermined disturbances
        // =================================================================
        let state = engine.apply_predetermined(timestep, state)?;
        if year < self.hat_start_year {
            debug!(year, timestep, "historical period, no allocation");
            check_cardinality(engine, timestep, before, &state)?;
            return Ok((state, None));
        }

        // =================================================================
        // PHASE 2: allocation on the hypothetical end of timestep
        // =================================================================
        let stands = engine.preview(&state)?;
        let context = TimestepContext { timestep, year };
        let report = self.strategy.allocate(&context, &stands)?;

        // =================================================================
        // PHASE 3: synthesized events go back into the same timestep
        // =================================================================
        let state = if report.records.is_empty() {
            state
        } else {
            let events: Vec<HarvestEvent> = report.records.iter().map(EventRecord::event).collect();
            engine.apply_events(timestep, state, &events)?
        };
        check_cardinality(engine, timestep, before, &state)?;
        Ok((state, Some(report)))
    }
}

fn check_cardinality<E: CarbonEngine>(
    engine: &E,
    timestep: u32,
    before: usize,
    state: &E::State,
) -> Result<()> {
    let after = engine.row_count(state);
    if after != before {
        return Err(HatError::CardinalityChanged {
            timestep,
            before,
            after,
        });
    }
    Ok(())
}

/// One scenario simulated from its initial state.
///
/// Reports are kept as they arrive so a failing run still exposes what it
/// produced up to the failure.
#[derive(Debug)]
pub struct ScenarioRun<E, S> {
    engine: E,
    driver: HarvestDriver<S>,
    timesteps: u32,
    reports: Vec<TimestepReport>,
}

impl<E: CarbonEngine, S: AllocationStrategy> ScenarioRun<E, S> {
    pub fn new(engine: E, driver: HarvestDriver<S>, timesteps: u32) -> Self {
        Self {
            engine,
            driver,
            timesteps,
            reports: Vec::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn run(&mut self, initial: E::State) -> Result<E::State> {
        let Self {
            engine,
            driver,
            timesteps,
            reports,
        } = &mut *self;
        info!(timesteps = *timesteps, "simulation started");
        let last = engine.simulate(*timesteps, initial, |engine, timestep, state| {
            let (state, report) = driver.dynamics(engine, timestep, state)?;
            reports.extend(report);
            Ok(state)
        })?;
        info!(events = self.events().count(), "simulation finished");
        Ok(last)
    }

    pub fn reports(&self) -> &[TimestepReport] {
        &self.reports
    }

    /// Cumulative events log, in timestep order.
    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.reports.iter().flat_map(|r| r.records.iter())
    }

    pub fn diagnostics(&self) -> Vec<YearDiagnostics> {
        self.reports
            .iter()
            .filter_map(|r| r.diagnostics.clone())
            .collect()
    }
}
