// src/strategy/implementations.rs

use tracing::info;

use crate::error::Result;
use crate::io::inputs::HatInputs;
use crate::model::skew::YearSkew;
use crate::model::stand::Stand;
use crate::model::template::ProductCreated;
use crate::simulation::config::HatConfig;
use crate::strategy::allocation::TieredAllocator;
use crate::strategy::eligibility::eligible_pairs;
use crate::strategy::materialize::materialize;
use crate::strategy::potential::{build_candidates, PotentialInputs};
use crate::strategy::reconcile::{produced_volumes, reconcile};
use crate::strategy::traits::{AllocationStrategy, TimestepContext, TimestepReport, YearDiagnostics};
use crate::strategy::units::UnitConverter;

// =========================================================================
// 1. Predetermined only
// =========================================================================

/// Never adds disturbances; the run follows its predetermined events.
#[derive(Debug, Clone, Default)]
pub struct PredeterminedOnly;

impl AllocationStrategy for PredeterminedOnly {
    fn allocate(&mut self, _context: &TimestepContext, _stands: &[Stand]) -> Result<TimestepReport> {
        Ok(TimestepReport::unchanged())
    }
}

// =========================================================================
// 2. Harvest Allocation Tool
// =========================================================================

/// Synthesizes harvest events so removals meet the IRW and FW demand.
#[derive(Debug)]
pub struct HarvestAllocationTool {
    inputs: HatInputs,
    settings: HatConfig,
}

impl HarvestAllocationTool {
    pub fn new(inputs: HatInputs, settings: HatConfig) -> Self {
        Self { inputs, settings }
    }

    fn converter(&self) -> UnitConverter {
        UnitConverter::new(self.settings.carbon_fraction)
    }

    fn potential_inputs(&self, year: i32) -> Result<PotentialInputs<'_>> {
        Ok(PotentialInputs {
            converter: self.converter(),
            proportions: &self.inputs.proportions,
            irw_fractions: self.inputs.irw_fractions.for_year(year)?,
            coefficients: &self.inputs.coefficients,
            forest_type_index: self.inputs.forest_type_index,
        })
    }

    fn year_skew(&self, year: i32) -> Result<YearSkew> {
        let skew = self.inputs.skew.for_year(year)?;
        if skew.has_product(ProductCreated::IrwAndFw) {
            skew.for_year(year, ProductCreated::IrwAndFw)
        } else {
            Ok(YearSkew::neutral(year))
        }
    }
}

impl AllocationStrategy for HarvestAllocationTool {
    fn allocate(&mut self, context: &TimestepContext, stands: &[Stand]) -> Result<TimestepReport> {
        let potential = self.potential_inputs(context.year)?;
        let produced = produced_volumes(stands, &potential)?;
        let balance = reconcile(context.year, &self.inputs.demand, produced)?;
        let mut diagnostics = YearDiagnostics::from_balance(context, &balance);

        if balance.is_satisfied() {
            info!(year = context.year, "predetermined disturbances satisfy the demand");
            return Ok(TimestepReport {
                diagnostics: Some(diagnostics),
                ..TimestepReport::default()
            });
        }

        let templates = self.inputs.templates.for_year(context.year)?;
        let eligible = eligible_pairs(stands, templates);
        if eligible.is_empty() {
            info!(year = context.year, "no stand is eligible for any event template");
            return Ok(TimestepReport {
                diagnostics: Some(diagnostics),
                ..TimestepReport::default()
            });
        }

        let candidates = build_candidates(
            stands,
            templates,
            &eligible,
            &potential,
            self.settings.tolerance,
        )?;
        let skew = self.year_skew(context.year)?;
        let allocation = TieredAllocator::new(self.converter(), self.settings.tolerance)
            .allocate(&balance, candidates, &skew)?;

        let records = materialize(context.year, context.timestep, allocation.candidates)?;
        diagnostics.record_allocation(&allocation.summary, &records);
        info!(
            year = context.year,
            timestep = context.timestep,
            events = records.len(),
            "harvest events synthesized"
        );

        Ok(TimestepReport {
            diagnostics: Some(diagnostics),
            records,
            warnings: allocation.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;

    use crate::io::demand::Demand;
    use crate::io::inputs::{event_templates, ByScenario};
    use crate::io::table::Table;
    use crate::model::classifier::{ClassifierPattern, Classifiers};
    use crate::model::coefficients::{
        CoefficientTable, IrwFraction, IrwFractionTable, ProductProportions, WoodCoefficients,
    };
    use crate::model::skew::SkewTable;
    use crate::model::stand::{CarbonSource, SourcePools};
    use crate::model::template::EventTemplate;
    use crate::simulation::config::TableChoice;
    use crate::strategy::eligibility::tests::{stand, template};

    fn inputs(templates: ByScenario<Vec<EventTemplate>>, irw: f64) -> HatInputs {
        let mut clearcut = SourcePools::default();
        clearcut[CarbonSource::SoftwoodMerch] = 1.0;
        let years = [(2020, irw), (2021, irw)];
        HatInputs {
            classifiers: Classifiers::new(["forest_type"]),
            forest_type_index: 0,
            templates,
            skew: ByScenario::fixed("reference", SkewTable::default()),
            irw_fractions: ByScenario::fixed(
                "reference",
                IrwFractionTable::new(vec![IrwFraction {
                    pattern: ClassifierPattern::parse(&["?"]),
                    disturbance_id: 20,
                    fractions: SourcePools::uniform(1.0),
                }]),
            ),
            coefficients: CoefficientTable::new([(
                "PA".to_string(),
                WoodCoefficients {
                    wood_density: 1.0 / 0.49,
                    bark_frac: 0.0,
                },
            )]),
            proportions: ProductProportions::new([(20, clearcut)]),
            demand: Demand::new(BTreeMap::from(years), BTreeMap::from([(2020, 0.0), (2021, 0.0)]), 1.0),
        }
    }

    fn stocked(forest_type: &str) -> Stand {
        let mut s = stand(&[forest_type], 50);
        s.carbon[CarbonSource::SoftwoodMerch] = 100.0;
        s
    }

    fn context(year: i32) -> TimestepContext {
        TimestepContext {
            timestep: (year - 2018) as u32,
            year,
        }
    }

    #[test]
    fn no_eligible_stand_is_not_an_error() {
        let templates = ByScenario::fixed("reference", vec![template(&["PA"], 20)]);
        let mut hat = HarvestAllocationTool::new(inputs(templates, 40.0), HatConfig::default());
        let report = hat.allocate(&context(2020), &[stocked("QA")]).unwrap();

        assert!(report.records.is_empty());
        assert!(report.warnings.is_empty());
        let diagnostics = report.diagnostics.unwrap();
        assert_eq!(diagnostics.year, 2020);
        assert_eq!(diagnostics.remain_irw_demand, 40.0);
        assert_eq!(diagnostics.n_events, 0);
        assert!(diagnostics.tot_irw_vol_avail.is_none());
    }

    #[test]
    fn demand_is_turned_into_a_mass_event() {
        let templates = ByScenario::fixed("reference", vec![template(&["PA"], 20)]);
        let mut hat = HarvestAllocationTool::new(inputs(templates, 40.0), HatConfig::default());
        let report = hat.allocate(&context(2020), &[stocked("PA")]).unwrap();

        assert_eq!(report.records.len(), 1);
        assert_relative_eq!(report.records[0].candidate.amount, 40.0, max_relative = 1e-9);
        assert_eq!(report.diagnostics.unwrap().n_events, 1);
    }

    #[test]
    fn templates_follow_the_yearly_choice() {
        let table = Table::parse_str(
            "events_templates",
            "scenario,forest_type,disturbance_type,sw_start,sw_end,hw_start,hw_end,\
             min_since_last_dist,max_since_last_dist,last_dist_id,product_created,dist_interval_bias,sort_type,efficiency\n\
             reference,PA,20,0,999,0,999,-1,-1,-1,irw_and_fw,1,MERCHCSORT_TOTAL,1\n\
             closed,QA,20,0,999,0,999,-1,-1,-1,irw_and_fw,1,MERCHCSORT_TOTAL,1\n",
        )
        .unwrap();
        let choice = TableChoice::ByYear(BTreeMap::from([
            (2020, "reference".to_string()),
            (2021, "closed".to_string()),
        ]));
        let classifiers = Classifiers::new(["forest_type"]);
        let templates = ByScenario::load(&table, &choice, |t| event_templates(t, &classifiers)).unwrap();
        let mut hat = HarvestAllocationTool::new(inputs(templates, 40.0), HatConfig::default());

        let stands = [stocked("PA")];
        assert_eq!(hat.allocate(&context(2020), &stands).unwrap().records.len(), 1);
        assert!(hat.allocate(&context(2021), &stands).unwrap().records.is_empty());
    }
}
