// src/simulation/inventory.rs

//! A small in-memory carbon engine.
//!
//! Stands keep carbon per hectare in the eight harvestable sources.
//! Disturbances move carbon to products with a partial intensity, so a
//! stand row is never split and the row count stays fixed. At the end of
//! each timestep living pools grow, snags decay and every stand ages.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::error::Result;
use crate::model::classifier::{ClassifierCatalog, Classifiers};
use crate::model::coefficients::ProductProportions;
use crate::model::stand::{SourcePools, Stand};
use crate::model::template::SortType;
use crate::simulation::config::GrowthConfig;
use crate::simulation::engine::CarbonEngine;
use crate::strategy::materialize::{HarvestEvent, MeasurementType};

/// One stand group of the inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct StandRow {
    pub classifiers: Vec<String>,
    /// Hectares.
    pub area: f64,
    pub age: u32,
    pub time_since_last_disturbance: u32,
    pub last_disturbance_id: Option<u32>,
    pub disturbance_id: Option<u32>,
    /// tC per hectare.
    pub pools: SourcePools,
    /// tC per hectare sent to products during the current timestep.
    pub to_product: SourcePools,
}

impl StandRow {
    fn accepts(&self, event: &HarvestEvent) -> bool {
        self.disturbance_id.is_none()
            && event.pattern.matches(&self.classifiers)
            && (event.sw_start..=event.sw_end).contains(&self.age)
            && event
                .last_dist_id
                .map_or(true, |id| self.last_disturbance_id == Some(id))
            && event
                .min_since_last_dist
                .map_or(true, |min| min <= self.time_since_last_disturbance)
    }

    fn merch_carbon(&self) -> f64 {
        self.pools
            .iter()
            .filter(|(source, _)| source.is_merch())
            .map(|(_, c)| c)
            .sum::<f64>()
            * self.area
    }

    /// Carbon the disturbance would take at full intensity, in tC.
    fn removable(&self, proportions: &SourcePools) -> f64 {
        self.pools
            .iter()
            .map(|(source, c)| c * proportions[source])
            .sum::<f64>()
            * self.area
    }

    fn disturb(&mut self, disturbance_id: u32, proportions: &SourcePools, intensity: f64) {
        for (source, carbon) in self.pools.iter().collect::<Vec<_>>() {
            let flux = carbon * proportions[source] * intensity;
            self.pools[source] -= flux;
            self.to_product[source] += flux;
        }
        self.disturbance_id = Some(disturbance_id);
    }

    /// One year of ageing, growth of the living pools and snag decay.
    fn grow(&mut self, growth: &GrowthConfig) {
        self.age += 1;
        for (source, carbon) in self.pools.iter().collect::<Vec<_>>() {
            self.pools[source] = if source.is_snag() {
                carbon * (1.0 - growth.snag_decay)
            } else {
                carbon * (1.0 + growth.standing_growth)
            };
        }
    }

    fn snapshot(&self) -> Stand {
        Stand {
            classifiers: self.classifiers.clone(),
            area: self.area,
            age: self.age,
            time_since_last_disturbance: self.time_since_last_disturbance,
            last_disturbance_id: self.last_disturbance_id,
            disturbance_id: self.disturbance_id,
            carbon: self.pools.scaled(self.area),
            to_product: self.to_product.scaled(self.area),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryState {
    pub rows: Vec<StandRow>,
}

impl InventoryState {
    pub fn new(rows: Vec<StandRow>) -> Self {
        Self { rows }
    }

    /// Standing carbon of the harvestable sources, tC.
    pub fn total_carbon(&self) -> f64 {
        self.rows.iter().map(|r| r.pools.total() * r.area).sum()
    }
}

#[derive(Debug, Clone)]
pub struct InventoryEngine {
    classifiers: Classifiers,
    inventory_start_year: i32,
    proportions: ProductProportions,
    predetermined: Vec<HarvestEvent>,
    growth: GrowthConfig,
}

impl InventoryEngine {
    pub fn new(
        classifiers: Classifiers,
        inventory_start_year: i32,
        proportions: ProductProportions,
        predetermined: Vec<HarvestEvent>,
        growth: GrowthConfig,
    ) -> Self {
        Self {
            classifiers,
            inventory_start_year,
            proportions,
            predetermined,
            growth,
        }
    }

    fn year_of(&self, timestep: u32) -> i32 {
        self.inventory_start_year + timestep as i32
    }

    /// Spreads one event target over the eligible rows in sort order.
    fn apply_event(&self, rows: &mut [StandRow], event: &HarvestEvent) -> Result<()> {
        let proportions = self.proportions.get(event.disturbance_id)?;
        let mut order: Vec<usize> = (0..rows.len()).filter(|&i| rows[i].accepts(event)).collect();
        match event.sort_type {
            SortType::MerchCarbonTotal => order.sort_by(|&a, &b| {
                rows[b]
                    .merch_carbon()
                    .partial_cmp(&rows[a].merch_carbon())
                    .unwrap_or(Ordering::Equal)
            }),
            SortType::OldestFirst => order.sort_by(|&a, &b| rows[b].age.cmp(&rows[a].age)),
        }

        let mut remaining = event.amount;
        for i in order {
            if remaining <= 0.0 {
                break;
            }
            let row = &mut rows[i];
            let capacity = match event.measurement_type {
                MeasurementType::Mass => row.removable(proportions),
                MeasurementType::Area => row.area,
            };
            if capacity <= 0.0 {
                continue;
            }
            let intensity = (remaining / capacity).min(1.0);
            row.disturb(event.disturbance_id, proportions, intensity);
            remaining -= capacity * intensity;
        }

        if remaining > 1e-9 * event.amount.max(1.0) {
            warn!(
                year = event.year,
                disturbance_id = event.disturbance_id,
                target = event.amount,
                shortfall = remaining,
                unit = event.measurement_type.as_str(),
                "event target could not be met by the eligible stands"
            );
        }
        Ok(())
    }

    fn apply_all<'a>(
        &self,
        mut state: InventoryState,
        events: impl IntoIterator<Item = &'a HarvestEvent>,
    ) -> Result<InventoryState> {
        for event in events {
            self.apply_event(&mut state.rows, event)?;
        }
        Ok(state)
    }
}

impl CarbonEngine for InventoryEngine {
    type State = InventoryState;

    fn row_count(&self, state: &InventoryState) -> usize {
        state.rows.len()
    }

    fn classifier_catalog(&self, state: &InventoryState) -> ClassifierCatalog {
        ClassifierCatalog::from_rows(
            &self.classifiers,
            state.rows.iter().map(|r| r.classifiers.as_slice()),
        )
    }

    fn apply_predetermined(&self, timestep: u32, state: InventoryState) -> Result<InventoryState> {
        let year = self.year_of(timestep);
        let events: Vec<&HarvestEvent> = self.predetermined.iter().filter(|e| e.year == year).collect();
        debug!(year, events = events.len(), "applying predetermined disturbances");
        self.apply_all(state, events)
    }

    /// Grows a copy of every row; fluxes and the current disturbance stay.
    fn preview(&self, state: &InventoryState) -> Result<Vec<Stand>> {
        Ok(state
            .rows
            .iter()
            .map(|row| {
                let mut next = row.clone();
                if next.disturbance_id.is_none() {
                    next.time_since_last_disturbance += 1;
                }
                next.grow(&self.growth);
                next.snapshot()
            })
            .collect())
    }

    fn apply_events(
        &self,
        _timestep: u32,
        state: InventoryState,
        events: &[HarvestEvent],
    ) -> Result<InventoryState> {
        self.apply_all(state, events)
    }

    fn end_timestep(&self, _timestep: u32, mut state: InventoryState) -> Result<InventoryState> {
        for row in &mut state.rows {
            match row.disturbance_id.take() {
                Some(id) => {
                    row.last_disturbance_id = Some(id);
                    row.time_since_last_disturbance = 0;
                }
                None => row.time_since_last_disturbance += 1,
            }
            row.grow(&self.growth);
            row.to_product = SourcePools::default();
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::model::classifier::ClassifierPattern;
    use crate::model::stand::CarbonSource;

    fn row(forest_type: &str, age: u32, merch: f64) -> StandRow {
        let mut pools = SourcePools::default();
        pools[CarbonSource::SoftwoodMerch] = merch;
        pools[CarbonSource::SoftwoodStemSnag] = 10.0;
        StandRow {
            classifiers: vec![forest_type.to_string()],
            area: 2.0,
            age,
            time_since_last_disturbance: age,
            last_disturbance_id: None,
            disturbance_id: None,
            pools,
            to_product: SourcePools::default(),
        }
    }

    fn engine(predetermined: Vec<HarvestEvent>) -> InventoryEngine {
        let mut clearcut = SourcePools::default();
        clearcut[CarbonSource::SoftwoodMerch] = 1.0;
        InventoryEngine::new(
            Classifiers::new(["forest_type"]),
            2000,
            ProductProportions::new([(20, clearcut)]),
            predetermined,
            GrowthConfig::default(),
        )
    }

    fn event(amount: f64, sort_type: SortType) -> HarvestEvent {
        HarvestEvent {
            year: 2001,
            step: 1,
            pattern: ClassifierPattern::parse(&["PA"]),
            disturbance_id: 20,
            amount,
            measurement_type: MeasurementType::Mass,
            sort_type,
            sw_start: 0,
            sw_end: 999,
            last_dist_id: None,
            min_since_last_dist: None,
        }
    }

    #[test]
    fn mass_target_is_taken_from_largest_stock_first() {
        let state = InventoryState::new(vec![row("PA", 30, 50.0), row("PA", 80, 100.0), row("QA", 90, 100.0)]);
        let state = engine(Vec::new())
            .apply_events(1, state, &[event(250.0, SortType::MerchCarbonTotal)])
            .unwrap();
        // row 1 holds 200 tC and is emptied, row 0 gives the remaining 50 of its 100
        assert_relative_eq!(state.rows[1].pools[CarbonSource::SoftwoodMerch], 0.0);
        assert_relative_eq!(state.rows[0].pools[CarbonSource::SoftwoodMerch], 25.0);
        assert_relative_eq!(state.rows[0].to_product[CarbonSource::SoftwoodMerch], 25.0);
        assert_eq!(state.rows[2].disturbance_id, None);
        assert_relative_eq!(state.rows[0].pools[CarbonSource::SoftwoodStemSnag], 10.0);
    }

    #[test]
    fn oldest_first_and_single_disturbance_per_step() {
        let state = InventoryState::new(vec![row("PA", 30, 100.0), row("PA", 80, 100.0)]);
        let engine = engine(Vec::new());
        let state = engine
            .apply_events(1, state, &[event(100.0, SortType::OldestFirst), event(100.0, SortType::OldestFirst)])
            .unwrap();
        assert_eq!(state.rows[1].disturbance_id, Some(20));
        assert_eq!(state.rows[0].disturbance_id, Some(20));
        assert_relative_eq!(state.rows[1].pools[CarbonSource::SoftwoodMerch], 50.0);
        assert_relative_eq!(state.rows[0].pools[CarbonSource::SoftwoodMerch], 50.0);
    }

    #[test]
    fn predetermined_events_follow_their_year_and_history_advances() {
        let engine = engine(vec![event(20.0, SortType::MerchCarbonTotal)]);
        let state = InventoryState::new(vec![row("PA", 30, 100.0)]);
        let untouched = engine.apply_predetermined(2, state.clone()).unwrap();
        assert_eq!(untouched, state);

        let state = engine.apply_predetermined(1, state).unwrap();
        let preview = engine.preview(&state).unwrap();
        assert_relative_eq!(preview[0].to_product[CarbonSource::SoftwoodMerch], 20.0);
        assert_relative_eq!(preview[0].carbon[CarbonSource::SoftwoodMerch], 180.0 * 1.02);
        assert_eq!(preview[0].disturbance_id, Some(20));

        let state = engine.end_timestep(1, state).unwrap();
        let stand = &state.rows[0];
        assert_eq!(stand.age, 31);
        assert_eq!(stand.last_disturbance_id, Some(20));
        assert_eq!(stand.time_since_last_disturbance, 0);
        assert_eq!(stand.disturbance_id, None);
        assert_relative_eq!(stand.pools[CarbonSource::SoftwoodMerch], 90.0 * 1.02);
        assert_relative_eq!(stand.pools[CarbonSource::SoftwoodStemSnag], 10.0 * 0.95);
        assert_relative_eq!(stand.to_product.total(), 0.0);
    }

    #[test]
    fn preview_shows_the_completed_timestep() {
        let engine = engine(Vec::new());
        let state = InventoryState::new(vec![row("PA", 39, 50.0)]);
        let preview = engine.preview(&state).unwrap();

        let completed = engine.end_timestep(1, state.clone()).unwrap();
        assert_eq!(preview[0].age, 40);
        assert_eq!(preview[0].age, completed.rows[0].age);
        assert_eq!(preview[0].time_since_last_disturbance, 40);
        assert_relative_eq!(
            preview[0].carbon[CarbonSource::SoftwoodMerch],
            completed.rows[0].pools[CarbonSource::SoftwoodMerch] * 2.0
        );
        assert_relative_eq!(preview[0].carbon[CarbonSource::SoftwoodStemSnag], 10.0 * 0.95 * 2.0);
        // the state itself is untouched
        assert_eq!(state.rows[0].age, 39);
    }
}
