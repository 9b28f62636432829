// src/model/coefficients.rs

use std::collections::{BTreeMap, HashMap};

use crate::error::{HatError, Result};
use crate::model::classifier::ClassifierPattern;
use crate::model::stand::SourcePools;

/// Volume-to-mass conversion parameters of one forest type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WoodCoefficients {
    /// Oven-dry tonnes per cubic metre.
    pub wood_density: f64,
    pub bark_frac: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CoefficientTable {
    by_forest_type: HashMap<String, WoodCoefficients>,
}

impl CoefficientTable {
    pub fn new(entries: impl IntoIterator<Item = (String, WoodCoefficients)>) -> Self {
        Self {
            by_forest_type: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, forest_type: &str) -> Result<WoodCoefficients> {
        self.by_forest_type
            .get(forest_type)
            .copied()
            .ok_or_else(|| HatError::MissingCoefficient {
                forest_type: forest_type.to_string(),
            })
    }

    pub fn forest_types(&self) -> impl Iterator<Item = &str> {
        self.by_forest_type.keys().map(String::as_str)
    }
}

/// Share of each source's flux to products that becomes industrial roundwood.
#[derive(Debug, Clone, PartialEq)]
pub struct IrwFraction {
    pub pattern: ClassifierPattern,
    pub disturbance_id: u32,
    pub fractions: SourcePools,
}

#[derive(Debug, Clone, Default)]
pub struct IrwFractionTable {
    rows: Vec<IrwFraction>,
}

impl IrwFractionTable {
    pub fn new(rows: Vec<IrwFraction>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[IrwFraction] {
        &self.rows
    }

    /// First row for `disturbance_id` whose pattern accepts the classifiers.
    pub fn lookup(&self, classifiers: &[String], disturbance_id: u32) -> Result<&SourcePools> {
        self.rows
            .iter()
            .find(|r| r.disturbance_id == disturbance_id && r.pattern.matches(classifiers))
            .map(|r| &r.fractions)
            .ok_or_else(|| HatError::MissingIrwFraction {
                disturbance_id,
                classifiers: classifiers.to_vec(),
            })
    }
}

/// Proportion of each source a disturbance sends to products.
#[derive(Debug, Clone, Default)]
pub struct ProductProportions {
    by_disturbance: BTreeMap<u32, SourcePools>,
}

impl ProductProportions {
    pub fn new(entries: impl IntoIterator<Item = (u32, SourcePools)>) -> Self {
        Self {
            by_disturbance: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, disturbance_id: u32) -> Result<&SourcePools> {
        self.by_disturbance
            .get(&disturbance_id)
            .ok_or(HatError::MissingProportions { disturbance_id })
    }
}
