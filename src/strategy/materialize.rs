// src/strategy/materialize.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HatError, Result};
use crate::model::classifier::ClassifierPattern;
use crate::model::template::SortType;
use crate::strategy::potential::Candidate;

/// Unit of an event target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementType {
    /// Tonnes of carbon.
    #[serde(rename = "M")]
    Mass,
    /// Hectares.
    #[serde(rename = "A")]
    Area,
}

impl MeasurementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementType::Mass => "M",
            MeasurementType::Area => "A",
        }
    }
}

impl FromStr for MeasurementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "M" => Ok(MeasurementType::Mass),
            "A" => Ok(MeasurementType::Area),
            other => Err(format!("unknown measurement_type '{other}'")),
        }
    }
}

/// A disturbance the engine applies during one timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestEvent {
    pub year: i32,
    pub step: u32,
    pub pattern: ClassifierPattern,
    pub disturbance_id: u32,
    pub amount: f64,
    pub measurement_type: MeasurementType,
    pub sort_type: SortType,
    pub sw_start: u32,
    pub sw_end: u32,
    pub last_dist_id: Option<u32>,
    pub min_since_last_dist: Option<u32>,
}

/// A synthesized event together with the allocation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub year: i32,
    pub step: u32,
    pub measurement_type: MeasurementType,
    pub candidate: Candidate,
}

impl EventRecord {
    pub fn event(&self) -> HarvestEvent {
        let t = &self.candidate.template;
        HarvestEvent {
            year: self.year,
            step: self.step,
            pattern: t.pattern.clone(),
            disturbance_id: t.disturbance_id,
            amount: self.candidate.amount,
            measurement_type: self.measurement_type,
            sort_type: t.sort_type,
            sw_start: t.sw_start,
            sw_end: t.sw_end,
            last_dist_id: t.last_dist_id,
            min_since_last_dist: t.min_since_last_dist,
        }
    }
}

/// Keeps the candidates with something to remove as mass-targeted events.
pub fn materialize(year: i32, step: u32, candidates: Vec<Candidate>) -> Result<Vec<EventRecord>> {
    let mut records = Vec::new();
    for candidate in candidates {
        if candidate.amount < 0.0 || candidate.amount.is_nan() {
            return Err(HatError::NegativeAmount {
                disturbance_id: candidate.disturbance_id(),
                amount: candidate.amount,
            });
        }
        if candidate.amount == 0.0 {
            continue;
        }
        records.push(EventRecord {
            year,
            step,
            measurement_type: MeasurementType::Mass,
            candidate,
        });
    }
    Ok(records)
}
