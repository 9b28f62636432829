// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::model::template::Product;

/// Every failure the allocation tool can surface to its caller.
#[derive(Debug, Error)]
pub enum HatError {
    #[error("no wood density / bark fraction entry for forest type '{forest_type}'")]
    MissingCoefficient { forest_type: String },

    #[error("no IRW fraction row for disturbance {disturbance_id} and classifiers {classifiers:?}")]
    MissingIrwFraction {
        disturbance_id: u32,
        classifiers: Vec<String>,
    },

    #[error("no removal proportions defined for disturbance {disturbance_id}")]
    MissingProportions { disturbance_id: u32 },

    #[error("no harvest skew factor for year {year} and group {group:?}")]
    MissingSkewFactor { year: i32, group: Vec<String> },

    #[error("no {product} demand for year {year}")]
    MissingDemand { product: Product, year: i32 },

    #[error("year {year}: {demand:.0} m3 of {product} demand remains but no eligible event can produce it")]
    InfeasibleAllocation {
        year: i32,
        product: Product,
        demand: f64,
    },

    #[error("{table}: classifier '{classifier}' value '{value}' does not exist in the inventory")]
    UnknownClassifierValue {
        table: String,
        classifier: String,
        value: String,
    },

    #[error("{table}: column '{classifier}' mixes wildcards and explicit values")]
    MixedWildcards { table: String, classifier: String },

    #[error("{table}: duplicated entries for key {key}")]
    DuplicateRows { table: String, key: String },

    #[error("candidate for disturbance {disturbance_id} has several values for '{attribute}' across age classes")]
    AmbiguousCandidate {
        disturbance_id: u32,
        attribute: &'static str,
    },

    #[error("aggregating candidates changed the {quantity} total from {before} to {after}")]
    AggregationMismatch {
        quantity: &'static str,
        before: f64,
        after: f64,
    },

    #[error("year {year}: allocated {allocated} m3 of {product} but {expected} m3 were required")]
    AllocationMismatch {
        year: i32,
        product: Product,
        expected: f64,
        allocated: f64,
    },

    #[error("event for disturbance {disturbance_id} has a negative amount {amount}")]
    NegativeAmount { disturbance_id: u32, amount: f64 },

    #[error("candidate for disturbance {disturbance_id} is not covered by exactly one allocation tier")]
    TierOverlap { disturbance_id: u32 },

    #[error("fuelwood-only disturbance {disturbance_id} would produce {irw_vol} m3 of IRW")]
    ProductMismatch { disturbance_id: u32, irw_vol: f64 },

    #[error("timestep {timestep}: engine state went from {before} to {after} rows")]
    CardinalityChanged {
        timestep: u32,
        before: usize,
        after: usize,
    },

    #[error("{}: line {line}: {message}", path.display())]
    InvalidInput {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, HatError>;
