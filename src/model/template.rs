// src/model/template.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::classifier::ClassifierPattern;

/// The two wood products demand is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Irw,
    Fw,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Irw => write!(f, "IRW"),
            Product::Fw => write!(f, "FW"),
        }
    }
}

/// What an event template harvests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCreated {
    IrwAndFw,
    FwOnly,
}

impl ProductCreated {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductCreated::IrwAndFw => "irw_and_fw",
            ProductCreated::FwOnly => "fw_only",
        }
    }
}

impl FromStr for ProductCreated {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "irw_and_fw" => Ok(ProductCreated::IrwAndFw),
            "fw_only" => Ok(ProductCreated::FwOnly),
            other => Err(format!("unknown product_created '{other}'")),
        }
    }
}

/// Order in which the engine picks stands when applying a mass target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortType {
    /// Largest merchantable carbon first.
    #[serde(rename = "MERCHCSORT_TOTAL")]
    MerchCarbonTotal,
    #[serde(rename = "OLDEST_FIRST")]
    OldestFirst,
}

impl SortType {
    pub fn as_str(self) -> &'static str {
        match self {
            SortType::MerchCarbonTotal => "MERCHCSORT_TOTAL",
            SortType::OldestFirst => "OLDEST_FIRST",
        }
    }
}

impl FromStr for SortType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "MERCHCSORT_TOTAL" => Ok(SortType::MerchCarbonTotal),
            "OLDEST_FIRST" => Ok(SortType::OldestFirst),
            other => Err(format!("unsupported sort_type '{other}'")),
        }
    }
}

/// A disturbance HAT may synthesize, with its eligibility rules.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTemplate {
    pub pattern: ClassifierPattern,
    pub disturbance_id: u32,
    pub sw_start: u32,
    pub sw_end: u32,
    pub hw_start: u32,
    pub hw_end: u32,
    /// `None` stands for the `-1` "any" sentinel.
    pub min_since_last_dist: Option<u32>,
    pub max_since_last_dist: Option<u32>,
    pub last_dist_id: Option<u32>,
    pub product_created: ProductCreated,
    pub dist_interval_bias: f64,
    pub sort_type: SortType,
    pub efficiency: f64,
}

impl EventTemplate {
    pub fn age_window(&self) -> std::ops::RangeInclusive<u32> {
        self.sw_start..=self.sw_end
    }
}

/// Converts the `-1` sentinel of the input tables.
pub fn optional_id(raw: i64) -> Option<u32> {
    if raw < 0 {
        None
    } else {
        u32::try_from(raw).ok()
    }
}

/// Writes an optional id back with the `-1` sentinel.
pub fn sentinel(value: Option<u32>) -> i64 {
    value.map_or(-1, i64::from)
}
