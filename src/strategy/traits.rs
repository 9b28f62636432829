// src/strategy/traits.rs

use std::fmt::Debug;

use serde::Serialize;

use crate::error::Result;
use crate::model::stand::Stand;
use crate::strategy::allocation::{AllocationSummary, OverAllocation};
use crate::strategy::materialize::EventRecord;
use crate::strategy::reconcile::DemandBalance;

/// Where in the simulation a strategy is being asked to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestepContext {
    pub timestep: u32,
    pub year: i32,
}

/// Scalar harvest figures of one simulated year.
///
/// Values a timestep never reached (e.g. no shortfall, so no allocation)
/// stay empty in the output table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearDiagnostics {
    pub year: i32,
    pub timestep: u32,
    pub demand_irw_vol: f64,
    pub demand_fw_vol: f64,
    pub irw_predetermined: f64,
    pub fw_predetermined: f64,
    pub remain_irw_demand: f64,
    pub remain_fw_demand: f64,
    pub irw_salv_avail: Option<f64>,
    pub fw_salv_avail: Option<f64>,
    pub irw_silv_avail: Option<f64>,
    pub fw_colat: Option<f64>,
    pub still_remain_fw_vol: Option<f64>,
    pub tot_irw_vol_avail: Option<f64>,
    pub tot_fw_vol_avail: Option<f64>,
    pub n_events: usize,
}

impl YearDiagnostics {
    pub fn from_balance(context: &TimestepContext, balance: &DemandBalance) -> Self {
        Self {
            year: context.year,
            timestep: context.timestep,
            demand_irw_vol: balance.demand.irw,
            demand_fw_vol: balance.demand.fw,
            irw_predetermined: balance.produced.irw,
            fw_predetermined: balance.produced.fw,
            remain_irw_demand: balance.raw_remaining_irw(),
            remain_fw_demand: balance.raw_remaining_fw(),
            ..Self::default()
        }
    }

    pub fn record_allocation(&mut self, summary: &AllocationSummary, records: &[EventRecord]) {
        self.irw_salv_avail = Some(summary.irw_salv_avail);
        self.fw_salv_avail = Some(summary.fw_salv_avail);
        self.irw_silv_avail = Some(summary.irw_silv_avail);
        self.fw_colat = Some(summary.fw_colat);
        self.still_remain_fw_vol = Some(summary.still_remain_fw);
        self.tot_irw_vol_avail = Some(records.iter().map(|r| r.candidate.irw_avail).sum());
        self.tot_fw_vol_avail = Some(records.iter().map(|r| r.candidate.fw_avail).sum());
        self.n_events = records.len();
    }
}

/// Everything a strategy decided for one timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimestepReport {
    pub diagnostics: Option<YearDiagnostics>,
    pub records: Vec<EventRecord>,
    pub warnings: Vec<OverAllocation>,
}

impl TimestepReport {
    pub fn unchanged() -> Self {
        Self::default()
    }
}

/// Decides which extra disturbances a timestep needs.
///
/// The driver injects one implementation; it only sees the stand snapshot
/// and returns events plus diagnostics, never mutating shared output.
pub trait AllocationStrategy: Debug + Send {
    fn allocate(&mut self, context: &TimestepContext, stands: &[Stand]) -> Result<TimestepReport>;
}
