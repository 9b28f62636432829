// src/io/inputs.rs

//! Loaders for the scenario input tables.
//!
//! Every loader takes an already filtered [`Table`], so the same code
//! serves files on disk and the in-memory tables of the tests.

use std::collections::{BTreeMap, HashSet};

use tracing::{info, warn};

use crate::error::{HatError, Result};
use crate::io::demand::Demand;
use crate::io::table::{Row, Table};
use crate::model::classifier::{check_wildcard_columns, ClassifierCatalog, Classifiers, WILDCARD};
use crate::model::coefficients::{
    CoefficientTable, IrwFraction, IrwFractionTable, ProductProportions, WoodCoefficients,
};
use crate::model::skew::{SkewColumn, SkewFactor, SkewTable};
use crate::model::stand::{CarbonSource, SourcePools};
use crate::model::template::{optional_id, EventTemplate, ProductCreated, SortType};
use crate::simulation::config::{ScenarioConfig, TableChoice};
use crate::simulation::inventory::StandRow;
use crate::strategy::materialize::{HarvestEvent, MeasurementType};

const DISTURBANCE: &str = "disturbance_type";
const YEAR_PREFIX: &str = "value_";

fn pools(row: &Row<'_>) -> Result<SourcePools> {
    let mut values = SourcePools::default();
    for source in CarbonSource::ALL {
        values[source] = row.parse(source.column())?;
    }
    Ok(values)
}

/// `-1` stands for "any" in the id columns.
fn sentinel_column(row: &Row<'_>, column: &str) -> Result<Option<u32>> {
    Ok(optional_id(row.parse::<i64>(column)?))
}

fn check_duplicates<K, I>(table: &Table, keys: I) -> Result<()>
where
    K: Eq + std::hash::Hash + std::fmt::Debug,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    for key in keys {
        let label = format!("{key:?}");
        if !seen.insert(key) {
            return Err(HatError::DuplicateRows {
                table: table.name(),
                key: label,
            });
        }
    }
    Ok(())
}

// =========================================================================
// Event templates
// =========================================================================

pub fn event_templates(table: &Table, classifiers: &Classifiers) -> Result<Vec<EventTemplate>> {
    let mut templates = Vec::with_capacity(table.len());
    for row in table.rows() {
        let template = EventTemplate {
            pattern: row.pattern(classifiers)?,
            disturbance_id: row.parse(DISTURBANCE)?,
            sw_start: row.parse("sw_start")?,
            sw_end: row.parse("sw_end")?,
            hw_start: row.parse("hw_start")?,
            hw_end: row.parse("hw_end")?,
            min_since_last_dist: sentinel_column(&row, "min_since_last_dist")?,
            max_since_last_dist: sentinel_column(&row, "max_since_last_dist")?,
            last_dist_id: sentinel_column(&row, "last_dist_id")?,
            product_created: row.parse("product_created")?,
            dist_interval_bias: row.parse("dist_interval_bias")?,
            sort_type: row.parse::<SortType>("sort_type")?,
            efficiency: row.parse("efficiency")?,
        };
        if template.sw_start != template.hw_start || template.sw_end != template.hw_end {
            return Err(row.error("softwood and hardwood age windows must be identical"));
        }
        if template.max_since_last_dist.is_some() {
            return Err(row.error("max_since_last_dist is not supported and must be -1"));
        }
        if template.dist_interval_bias <= 0.0 {
            return Err(row.error("dist_interval_bias must be positive"));
        }
        templates.push(template);
    }
    check_duplicates(
        table,
        templates.iter().map(|t| {
            (
                t.pattern.clone(),
                t.sw_start,
                t.sw_end,
                t.hw_start,
                t.hw_end,
                t.last_dist_id,
            )
        }),
    )?;
    check_wildcard_columns(&table.name(), classifiers, templates.iter().map(|t| &t.pattern))?;
    Ok(templates)
}

// =========================================================================
// Harvest skew factors
// =========================================================================

pub fn harvest_factors(table: &Table, classifiers: &Classifiers) -> Result<SkewTable> {
    let columns: Vec<(String, SkewColumn)> = table
        .headers()
        .filter_map(|h| {
            if h == DISTURBANCE {
                Some((h.to_string(), SkewColumn::Disturbance))
            } else {
                classifiers
                    .index_of(h)
                    .map(|i| (h.to_string(), SkewColumn::Classifier(i)))
            }
        })
        .collect();
    let years: Vec<(String, i32)> = table
        .headers()
        .filter_map(|h| {
            h.strip_prefix(YEAR_PREFIX)
                .and_then(|y| y.parse().ok())
                .map(|year| (h.to_string(), year))
        })
        .collect();
    if years.is_empty() && !table.is_empty() {
        return Err(HatError::InvalidInput {
            path: table.path().to_path_buf(),
            line: 1,
            message: format!("no '{YEAR_PREFIX}<year>' columns"),
        });
    }

    let mut rows = Vec::with_capacity(table.len());
    for row in table.rows() {
        let keys = columns
            .iter()
            .map(|(name, _)| row.optional(name).map(str::to_string))
            .collect();
        let mut values = BTreeMap::new();
        for (column, year) in &years {
            if let Some(raw) = row.optional(column) {
                let value: f64 = raw
                    .parse()
                    .map_err(|e| row.error(format!("column '{column}': {e}")))?;
                values.insert(*year, value);
            }
        }
        rows.push(SkewFactor {
            keys,
            product_created: row.parse::<ProductCreated>("product_created")?,
            values,
        });
    }
    check_duplicates(
        table,
        rows.iter().map(|r| (r.keys.clone(), r.product_created)),
    )?;
    SkewTable::new(columns, rows)
}

// =========================================================================
// Conversion tables
// =========================================================================

pub fn irw_fractions(table: &Table, classifiers: &Classifiers) -> Result<IrwFractionTable> {
    let mut rows = Vec::with_capacity(table.len());
    for row in table.rows() {
        let fractions = pools(&row)?;
        if fractions.iter().any(|(_, f)| !(0.0..=1.0).contains(&f)) {
            return Err(row.error("IRW fractions must lie in [0, 1]"));
        }
        rows.push(IrwFraction {
            pattern: row.pattern(classifiers)?,
            disturbance_id: row.parse(DISTURBANCE)?,
            fractions,
        });
    }
    check_duplicates(
        table,
        rows.iter().map(|r| (r.pattern.clone(), r.disturbance_id)),
    )?;
    check_wildcard_columns(&table.name(), classifiers, rows.iter().map(|r| &r.pattern))?;
    Ok(IrwFractionTable::new(rows))
}

/// Wood density and bark fraction per forest type.
pub fn wood_coefficients(table: &Table, forest_type_column: &str) -> Result<CoefficientTable> {
    table.require_columns([forest_type_column, "wood_density", "bark_frac"])?;
    let mut entries = Vec::with_capacity(table.len());
    for row in table.rows() {
        let coefs = WoodCoefficients {
            wood_density: row.parse("wood_density")?,
            bark_frac: row.parse("bark_frac")?,
        };
        if coefs.wood_density <= 0.0 || !(0.0..1.0).contains(&coefs.bark_frac) {
            return Err(row.error("wood_density must be positive and bark_frac in [0, 1)"));
        }
        entries.push((row.str(forest_type_column)?.to_string(), coefs));
    }
    check_duplicates(table, entries.iter().map(|(ft, _)| ft.clone()))?;
    Ok(CoefficientTable::new(entries))
}

pub fn product_proportions(table: &Table) -> Result<ProductProportions> {
    let mut entries = Vec::with_capacity(table.len());
    for row in table.rows() {
        entries.push((row.parse::<u32>(DISTURBANCE)?, pools(&row)?));
    }
    check_duplicates(table, entries.iter().map(|(id, _)| *id))?;
    Ok(ProductProportions::new(entries))
}

// =========================================================================
// Reference engine tables
// =========================================================================

/// Stand rows with carbon per hectare.
pub fn inventory(table: &Table, classifiers: &Classifiers) -> Result<Vec<StandRow>> {
    let mut rows = Vec::with_capacity(table.len());
    for row in table.rows() {
        let values = classifiers
            .names()
            .iter()
            .map(|name| row.str(name).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        if values.iter().any(|c| c == WILDCARD) {
            return Err(row.error("inventory rows cannot hold wildcards"));
        }
        let age: u32 = row.parse("age")?;
        rows.push(StandRow {
            classifiers: values,
            area: row.parse("area")?,
            age,
            time_since_last_disturbance: row
                .optional("time_since_last_disturbance")
                .map_or(Ok(age), |_| row.parse("time_since_last_disturbance"))?,
            last_disturbance_id: match row.optional("last_disturbance_id") {
                Some(_) => sentinel_column(&row, "last_disturbance_id")?,
                None => None,
            },
            disturbance_id: None,
            pools: pools(&row)?,
            to_product: SourcePools::default(),
        });
    }
    Ok(rows)
}

/// Disturbances fixed in advance, applied before any allocation.
pub fn predetermined_events(table: &Table, classifiers: &Classifiers) -> Result<Vec<HarvestEvent>> {
    let mut events = Vec::with_capacity(table.len());
    for row in table.rows() {
        let amount: f64 = row.parse("amount")?;
        if amount < 0.0 {
            return Err(row.error("amount cannot be negative"));
        }
        events.push(HarvestEvent {
            year: row.parse("year")?,
            step: 0,
            pattern: row.pattern(classifiers)?,
            disturbance_id: row.parse(DISTURBANCE)?,
            amount,
            measurement_type: row.parse::<MeasurementType>("measurement_type")?,
            sort_type: row.parse::<SortType>("sort_type")?,
            sw_start: row.parse("sw_start")?,
            sw_end: row.parse("sw_end")?,
            last_dist_id: sentinel_column(&row, "last_dist_id")?,
            min_since_last_dist: sentinel_column(&row, "min_since_last_dist")?,
        });
    }
    Ok(events)
}

// =========================================================================
// Bundle
// =========================================================================

/// A scenario-dependent table, parsed once per scenario the run chooses.
#[derive(Debug, Clone)]
pub struct ByScenario<T> {
    choice: TableChoice,
    tables: BTreeMap<String, T>,
}

impl<T> ByScenario<T> {
    pub fn load(
        table: &Table,
        choice: &TableChoice,
        mut parse: impl FnMut(&Table) -> Result<T>,
    ) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for scenario in choice.scenarios() {
            let parsed = parse(&table.clone().filter_scenario(scenario))?;
            tables.insert(scenario.to_string(), parsed);
        }
        Ok(Self {
            choice: choice.clone(),
            tables,
        })
    }

    /// The same table in every year.
    pub fn fixed(scenario: &str, value: T) -> Self {
        Self {
            choice: TableChoice::Fixed(scenario.to_string()),
            tables: BTreeMap::from([(scenario.to_string(), value)]),
        }
    }

    pub fn for_year(&self, year: i32) -> Result<&T> {
        self.choice
            .for_year(year)
            .and_then(|scenario| self.tables.get(scenario))
            .ok_or_else(|| HatError::Config(format!("no scenario chosen for year {year}")))
    }

    pub fn all(&self) -> impl Iterator<Item = &T> {
        self.tables.values()
    }
}

/// Everything the allocation tool reads besides the stand snapshots.
#[derive(Debug, Clone)]
pub struct HatInputs {
    pub classifiers: Classifiers,
    pub forest_type_index: usize,
    pub templates: ByScenario<Vec<EventTemplate>>,
    pub skew: ByScenario<SkewTable>,
    pub irw_fractions: ByScenario<IrwFractionTable>,
    pub coefficients: CoefficientTable,
    pub proportions: ProductProportions,
    pub demand: Demand,
}

impl HatInputs {
    pub fn load(config: &ScenarioConfig) -> Result<Self> {
        let classifiers = Classifiers::new(config.classifiers.iter().cloned());
        let forest_type_index = classifiers
            .index_of(&config.forest_type_classifier)
            .ok_or_else(|| HatError::Config("forest type classifier is missing".into()))?;
        let paths = &config.inputs;
        let choices = &config.choices;

        let templates = ByScenario::load(
            &Table::read(&config.resolve(&paths.events_templates))?,
            &choices.events_templates,
            |t| event_templates(t, &classifiers),
        )?;
        let skew = ByScenario::load(
            &Table::read(&config.resolve(&paths.harvest_factors))?,
            &choices.harvest_factors,
            |t| harvest_factors(t, &classifiers),
        )?;
        let irw_fractions = ByScenario::load(
            &Table::read(&config.resolve(&paths.irw_frac_by_dist))?,
            &choices.irw_frac_by_dist,
            |t| irw_fractions(t, &classifiers),
        )?;
        let coefficients = wood_coefficients(
            &Table::read(&config.resolve(&paths.vol_to_mass_coefs))?,
            &config.forest_type_classifier,
        )?;
        let proportions =
            product_proportions(&Table::read(&config.resolve(&paths.disturbance_proportions))?)?;
        let demand = Demand::from_config(config, config.hat_start_year..=config.final_year())?;

        for table in skew.all() {
            for (product, year, sum) in table.unnormalized_sums(config.hat.skew_sum_tolerance) {
                warn!(
                    product = product.as_str(),
                    year,
                    sum,
                    "harvest skew factors do not sum to one"
                );
            }
        }
        info!(
            scenario = %config.label(),
            templates = templates.all().map(Vec::len).sum::<usize>(),
            "allocation inputs loaded"
        );

        Ok(Self {
            classifiers,
            forest_type_index,
            templates,
            skew,
            irw_fractions,
            coefficients,
            proportions,
            demand,
        })
    }

    /// Every explicit classifier value must exist in the simulated inventory.
    pub fn check_classifiers(&self, catalog: &ClassifierCatalog) -> Result<()> {
        for template in self.templates.all().flatten() {
            catalog.check_pattern("events_templates", &template.pattern)?;
        }
        for fraction in self.irw_fractions.all().flat_map(IrwFractionTable::rows) {
            catalog.check_pattern("irw_frac_by_dist", &fraction.pattern)?;
        }
        for skew in self.skew.all() {
            skew.check_classifiers(catalog)?;
        }
        for forest_type in self.coefficients.forest_types() {
            if !catalog.contains(self.forest_type_index, forest_type) {
                warn!(forest_type, "wood coefficients given for a forest type absent from the inventory");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifiers() -> Classifiers {
        Classifiers::new(["forest_type", "region"])
    }

    const TEMPLATE_HEADER: &str = "scenario,forest_type,region,disturbance_type,sw_start,sw_end,hw_start,hw_end,\
        min_since_last_dist,max_since_last_dist,last_dist_id,product_created,dist_interval_bias,sort_type,efficiency\n";

    #[test]
    fn templates_are_parsed_with_sentinels() {
        let text = format!(
            "{TEMPLATE_HEADER}reference,PA,?,20,40,999,40,999,-1,-1,-1,irw_and_fw,5,MERCHCSORT_TOTAL,0.9\n\
             reference,PA,?,29,0,999,0,999,-1,-1,4,irw_and_fw,1,OLDEST_FIRST,1\n\
             other,QA,?,20,0,999,0,999,-1,-1,-1,fw_only,1,MERCHCSORT_TOTAL,1\n"
        );
        let table = Table::parse_str("events_templates", &text)
            .unwrap()
            .filter_scenario("reference");
        let templates = event_templates(&table, &classifiers()).unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].dist_interval_bias, 5.0);
        assert_eq!(templates[0].last_dist_id, None);
        assert_eq!(templates[1].last_dist_id, Some(4));
        assert_eq!(templates[1].sort_type, SortType::OldestFirst);
    }

    #[test]
    fn differing_hardwood_window_is_rejected() {
        let text = format!(
            "{TEMPLATE_HEADER}reference,PA,?,20,40,999,30,999,-1,-1,-1,irw_and_fw,1,MERCHCSORT_TOTAL,1\n"
        );
        let table = Table::parse_str("events_templates", &text).unwrap();
        assert!(matches!(
            event_templates(&table, &classifiers()),
            Err(HatError::InvalidInput { line: 2, .. })
        ));
    }

    #[test]
    fn duplicated_templates_are_rejected() {
        let text = format!(
            "{TEMPLATE_HEADER}reference,PA,?,20,40,999,40,999,-1,-1,-1,irw_and_fw,1,MERCHCSORT_TOTAL,1\n\
             reference,PA,?,22,40,999,40,999,-1,-1,-1,fw_only,1,MERCHCSORT_TOTAL,1\n"
        );
        let table = Table::parse_str("events_templates", &text).unwrap();
        assert!(matches!(
            event_templates(&table, &classifiers()),
            Err(HatError::DuplicateRows { .. })
        ));
    }

    #[test]
    fn harvest_factor_columns_are_mapped() {
        let text = "scenario,forest_type,disturbance_type,product_created,silv_practice,value_2020,value_2021\n\
                    reference,PA,,irw_and_fw,thinning,0.4,0.5\n\
                    reference,QA,,irw_and_fw,thinning,0.6,0.5\n\
                    reference,,,fw_only,,1,1\n";
        let table = Table::parse_str("harvest_factors", text)
            .unwrap()
            .filter_scenario("reference");
        let skew = harvest_factors(&table, &classifiers()).unwrap();
        assert_eq!(
            skew.columns(),
            &[
                ("forest_type".to_string(), SkewColumn::Classifier(0)),
                ("disturbance_type".to_string(), SkewColumn::Disturbance),
            ]
        );
        assert_eq!(skew.join_columns(ProductCreated::IrwAndFw), vec![0]);
        assert!(skew.unnormalized_sums(1e-8).is_empty());
    }

    #[test]
    fn coefficients_reject_duplicates() {
        let text = "forest_type,wood_density,bark_frac\nPA,0.4,0.1\nPA,0.5,0.1\n";
        let table = Table::parse_str("vol_to_mass_coefs", text).unwrap();
        assert!(matches!(
            wood_coefficients(&table, "forest_type"),
            Err(HatError::DuplicateRows { .. })
        ));
    }

    #[test]
    fn irw_fractions_mixing_wildcards_fail() {
        let header = "forest_type,region,disturbance_type,softwood_merch,hardwood_merch,softwood_other,\
            hardwood_other,softwood_stem_snag,hardwood_stem_snag,softwood_branch_snag,hardwood_branch_snag\n";
        let text = format!("{header}PA,?,20,1,1,0,0,0.5,0.5,0,0\nQA,LU00,20,1,1,0,0,0.5,0.5,0,0\n");
        let table = Table::parse_str("irw_frac_by_dist", &text).unwrap();
        assert!(matches!(
            irw_fractions(&table, &classifiers()),
            Err(HatError::MixedWildcards { ref classifier, .. }) if classifier == "region"
        ));
    }
}
