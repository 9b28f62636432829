// src/simulation/config.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{HatError, Result};
use crate::strategy::units::DEFAULT_CARBON_FRACTION;

/// Numerical settings of the allocation itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HatConfig {
    pub carbon_fraction: f64,
    /// Relative tolerance of the allocation and aggregation checks.
    pub tolerance: f64,
    /// How far the harvest factors of one year may sum away from one
    /// before a warning is logged.
    pub skew_sum_tolerance: f64,
}

impl Default for HatConfig {
    fn default() -> Self {
        Self {
            carbon_fraction: DEFAULT_CARBON_FRACTION,
            tolerance: 1e-6,
            skew_sum_tolerance: 1e-8,
        }
    }
}

/// Yearly rates of the reference inventory engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Relative yearly increase of the living pools.
    pub standing_growth: f64,
    /// Relative yearly loss of the snag pools.
    pub snag_decay: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            standing_growth: 0.02,
            snag_decay: 0.05,
        }
    }
}

fn default_multiplier() -> f64 {
    1000.0
}

/// Where the yearly IRW and FW demand comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemandSource {
    /// Two `year,value` tables in thousand m3 under bark.
    Files {
        irw: PathBuf,
        fw: PathBuf,
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    /// The same volume (m3) every year.
    Constant { irw: f64, fw: f64 },
    /// Seeded draws from a normal distribution (m3).
    Normal {
        irw_mean: f64,
        irw_std_dev: f64,
        fw_mean: f64,
        fw_std_dev: f64,
        seed: u64,
    },
}

/// Input tables of a scenario, relative to the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct InputPaths {
    pub inventory: PathBuf,
    pub events: PathBuf,
    pub events_templates: PathBuf,
    pub harvest_factors: PathBuf,
    pub irw_frac_by_dist: PathBuf,
    pub vol_to_mass_coefs: PathBuf,
    pub disturbance_proportions: PathBuf,
}

/// Value of the `scenario` column kept from a table, either for the whole
/// run or year by year.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TableChoice {
    Fixed(String),
    ByYear(BTreeMap<i32, String>),
}

impl Default for TableChoice {
    fn default() -> Self {
        TableChoice::Fixed("reference".to_string())
    }
}

impl TableChoice {
    pub fn for_year(&self, year: i32) -> Option<&str> {
        match self {
            TableChoice::Fixed(scenario) => Some(scenario.as_str()),
            TableChoice::ByYear(years) => years.get(&year).map(String::as_str),
        }
    }

    /// Every scenario the table is filtered by at some point of the run.
    pub fn scenarios(&self) -> BTreeSet<&str> {
        match self {
            TableChoice::Fixed(scenario) => BTreeSet::from([scenario.as_str()]),
            TableChoice::ByYear(years) => years.values().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioChoices {
    pub events_templates: TableChoice,
    pub harvest_factors: TableChoice,
    pub irw_frac_by_dist: TableChoice,
}

impl ScenarioChoices {
    /// Year-by-year choices must name a scenario for every allocated year.
    pub fn check_years(&self, years: RangeInclusive<i32>) -> Result<()> {
        let tables = [
            ("events_templates", &self.events_templates),
            ("harvest_factors", &self.harvest_factors),
            ("irw_frac_by_dist", &self.irw_frac_by_dist),
        ];
        for (table, choice) in tables {
            if let Some(year) = years.clone().find(|&y| choice.for_year(y).is_none()) {
                return Err(HatError::Config(format!(
                    "no {table} scenario chosen for year {year}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    #[default]
    Hat,
    PredeterminedOnly,
}

fn default_forest_type() -> String {
    "forest_type".to_string()
}

/// One country/combo scenario, read from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub country: String,
    pub combo: String,
    /// Calendar year of timestep zero.
    pub inventory_start_year: i32,
    /// First year in which harvest events are synthesized.
    pub hat_start_year: i32,
    pub timesteps: u32,
    pub classifiers: Vec<String>,
    #[serde(default = "default_forest_type")]
    pub forest_type_classifier: String,
    #[serde(default)]
    pub choices: ScenarioChoices,
    pub inputs: InputPaths,
    pub demand: DemandSource,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub allocation: AllocationMode,
    #[serde(default)]
    pub hat: HatConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ScenarioConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_yaml_str(&text, base_dir)
    }

    pub fn from_yaml_str(text: &str, base_dir: PathBuf) -> Result<Self> {
        let mut config: ScenarioConfig = serde_yaml::from_str(text)?;
        config.base_dir = base_dir;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.timesteps == 0 {
            return Err(HatError::Config("timesteps must be at least 1".into()));
        }
        if self.classifiers.is_empty() {
            return Err(HatError::Config("at least one classifier is required".into()));
        }
        if !self.classifiers.contains(&self.forest_type_classifier) {
            return Err(HatError::Config(format!(
                "forest type classifier '{}' is not among the classifiers",
                self.forest_type_classifier
            )));
        }
        if !(self.hat.carbon_fraction > 0.0 && self.hat.carbon_fraction <= 1.0) {
            return Err(HatError::Config(format!(
                "carbon_fraction must be in (0, 1], got {}",
                self.hat.carbon_fraction
            )));
        }
        if self.hat.tolerance <= 0.0 {
            return Err(HatError::Config("tolerance must be positive".into()));
        }
        if let DemandSource::Normal {
            irw_mean,
            irw_std_dev,
            fw_mean,
            fw_std_dev,
            ..
        } = &self.demand
        {
            for (name, value) in [("irw_std_dev", irw_std_dev), ("fw_std_dev", fw_std_dev)] {
                if !(value.is_finite() && *value >= 0.0) {
                    return Err(HatError::Config(format!(
                        "{name} must be finite and non-negative, got {value}"
                    )));
                }
            }
            if !(irw_mean.is_finite() && fw_mean.is_finite()) {
                return Err(HatError::Config("demand means must be finite".into()));
            }
        }
        self.choices.check_years(self.hat_start_year..=self.final_year())?;
        Ok(())
    }

    /// Paths in the file are relative to the file itself.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output_dir)
    }

    pub fn year_of(&self, timestep: u32) -> i32 {
        self.inventory_start_year + timestep as i32
    }

    pub fn final_year(&self) -> i32 {
        self.year_of(self.timesteps)
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.country, self.combo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
country: ZZ
combo: reference
inventory_start_year: 2010
hat_start_year: 2012
timesteps: 5
classifiers: [forest_type, region]
inputs:
  inventory: inventory.csv
  events: events.csv
  events_templates: events_templates.csv
  harvest_factors: harvest_factors.csv
  irw_frac_by_dist: irw_frac_by_dist.csv
  vol_to_mass_coefs: vol_to_mass_coefs.csv
  disturbance_proportions: disturbance_proportions.csv
demand:
  kind: constant
  irw: 100.0
  fw: 50.0
output_dir: out
"#;

    #[test]
    fn defaults_fill_the_optional_sections() {
        let config = ScenarioConfig::from_yaml_str(YAML, PathBuf::from("/data/zz")).unwrap();
        assert_eq!(config.hat.carbon_fraction, 0.49);
        assert_eq!(config.allocation, AllocationMode::Hat);
        assert_eq!(config.choices.harvest_factors.for_year(2013), Some("reference"));
        assert_eq!(config.year_of(3), 2013);
        assert_eq!(config.final_year(), 2015);
        assert_eq!(config.output_dir(), PathBuf::from("/data/zz/out"));
    }

    #[test]
    fn unknown_forest_type_classifier_is_rejected() {
        let yaml = YAML.replace("[forest_type, region]", "[species, region]");
        let err = ScenarioConfig::from_yaml_str(&yaml, PathBuf::new()).unwrap_err();
        assert!(matches!(err, HatError::Config(_)));
    }

    #[test]
    fn demand_files_default_to_thousands() {
        let yaml = YAML.replace(
            "  kind: constant\n  irw: 100.0\n  fw: 50.0\n",
            "  kind: files\n  irw: irw.csv\n  fw: fw.csv\n",
        );
        let config = ScenarioConfig::from_yaml_str(&yaml, PathBuf::new()).unwrap();
        assert!(matches!(config.demand, DemandSource::Files { multiplier, .. } if multiplier == 1000.0));
    }

    #[test]
    fn choices_can_change_by_year() {
        let yaml = YAML.replace(
            "output_dir: out\n",
            "output_dir: out\nchoices:\n  harvest_factors: {2012: reference, 2013: push, 2014: push, 2015: reference}\n",
        );
        let config = ScenarioConfig::from_yaml_str(&yaml, PathBuf::new()).unwrap();
        let choice = &config.choices.harvest_factors;
        assert_eq!(choice.for_year(2013), Some("push"));
        assert_eq!(choice.for_year(2015), Some("reference"));
        assert_eq!(choice.scenarios(), BTreeSet::from(["push", "reference"]));
        assert_eq!(config.choices.events_templates.for_year(2014), Some("reference"));

        let gap = yaml.replace("2014: push, ", "");
        let err = ScenarioConfig::from_yaml_str(&gap, PathBuf::new()).unwrap_err();
        assert!(matches!(err, HatError::Config(ref m) if m.contains("2014")));
    }

    #[test]
    fn negative_demand_spread_is_rejected() {
        let yaml = YAML.replace(
            "  kind: constant\n  irw: 100.0\n  fw: 50.0\n",
            "  kind: normal\n  irw_mean: 100.0\n  irw_std_dev: 5.0\n  fw_mean: 50.0\n  fw_std_dev: -1.0\n  seed: 3\n",
        );
        let err = ScenarioConfig::from_yaml_str(&yaml, PathBuf::new()).unwrap_err();
        assert!(matches!(err, HatError::Config(ref m) if m.contains("fw_std_dev")));
    }
}
