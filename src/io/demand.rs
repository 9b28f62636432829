// src/io/demand.rs

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::error::{HatError, Result};
use crate::model::template::Product;
use crate::simulation::config::{DemandSource, ScenarioConfig};

/// Yearly IRW and FW demand.
#[derive(Debug, Clone, Default)]
pub struct Demand {
    irw: BTreeMap<i32, f64>,
    fw: BTreeMap<i32, f64>,
    /// Factor turning stored values into m3 (1000 for tables in thousand m3).
    multiplier: f64,
}

impl Demand {
    pub fn new(irw: BTreeMap<i32, f64>, fw: BTreeMap<i32, f64>, multiplier: f64) -> Self {
        Self { irw, fw, multiplier }
    }

    /// Demand in m3 under bark.
    pub fn volume(&self, product: Product, year: i32) -> Result<f64> {
        let series = match product {
            Product::Irw => &self.irw,
            Product::Fw => &self.fw,
        };
        series
            .get(&year)
            .map(|v| v * self.multiplier)
            .ok_or(HatError::MissingDemand { product, year })
    }

    pub fn from_csv(irw: &Path, fw: &Path, multiplier: f64) -> Result<Self> {
        Ok(Self::new(read_series(irw)?, read_series(fw)?, multiplier))
    }

    /// Builds the demand a scenario asks for over `years`.
    pub fn from_config(config: &ScenarioConfig, years: RangeInclusive<i32>) -> Result<Self> {
        match &config.demand {
            DemandSource::Files { irw, fw, multiplier } => {
                Self::from_csv(&config.resolve(irw), &config.resolve(fw), *multiplier)
            }
            DemandSource::Constant { irw, fw } => Ok(Self::new(
                generate_constant_demand(years.clone(), *irw),
                generate_constant_demand(years, *fw),
                1.0,
            )),
            DemandSource::Normal {
                irw_mean,
                irw_std_dev,
                fw_mean,
                fw_std_dev,
                seed,
            } => {
                let mut rng = StdRng::seed_from_u64(*seed);
                Ok(Self::new(
                    generate_normal_demand(years.clone(), *irw_mean, *irw_std_dev, &mut rng)?,
                    generate_normal_demand(years, *fw_mean, *fw_std_dev, &mut rng)?,
                    1.0,
                ))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct DemandRow {
    year: i32,
    value: f64,
}

/// Reads a `year,value` table.
pub fn read_series(path: &Path) -> Result<BTreeMap<i32, f64>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut series = BTreeMap::new();
    for row in reader.deserialize() {
        let row: DemandRow = row?;
        if series.insert(row.year, row.value).is_some() {
            return Err(HatError::DuplicateRows {
                table: path.display().to_string(),
                key: row.year.to_string(),
            });
        }
    }
    Ok(series)
}

/// The same demand every year; handy for step-response style checks.
pub fn generate_constant_demand(years: RangeInclusive<i32>, value: f64) -> BTreeMap<i32, f64> {
    years.map(|year| (year, value)).collect()
}

/// Demand drawn from a normal distribution, clamped at zero.
pub fn generate_normal_demand<R: Rng>(
    years: RangeInclusive<i32>,
    mean: f64,
    std_dev: f64,
    rng: &mut R,
) -> Result<BTreeMap<i32, f64>> {
    // rand_distr 0.4 accepts a negative standard deviation and mirrors it
    if !(std_dev.is_finite() && std_dev >= 0.0) {
        return Err(HatError::Config(format!(
            "demand standard deviation must be finite and non-negative, got {std_dev}"
        )));
    }
    let normal = Normal::new(mean, std_dev)
        .map_err(|e| HatError::Config(format!("demand distribution: {e}")))?;
    Ok(years
        .map(|year| (year, normal.sample(&mut *rng).max(0.0)))
        .collect())
}
