// src/strategy/reconcile.rs

use crate::error::Result;
use crate::io::demand::Demand;
use crate::model::stand::Stand;
use crate::model::template::Product;
use crate::strategy::potential::PotentialInputs;
use crate::strategy::units::ProductVolumes;

/// Demand of one year against what predetermined disturbances already produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandBalance {
    pub year: i32,
    pub demand: ProductVolumes,
    pub produced: ProductVolumes,
}

impl DemandBalance {
    /// Unmet IRW demand, negative when predetermined harvest overshoots.
    pub fn raw_remaining_irw(&self) -> f64 {
        self.demand.irw - self.produced.irw
    }

    pub fn raw_remaining_fw(&self) -> f64 {
        self.demand.fw - self.produced.fw
    }

    pub fn remaining_irw(&self) -> f64 {
        self.raw_remaining_irw().max(0.0)
    }

    pub fn remaining_fw(&self) -> f64 {
        self.raw_remaining_fw().max(0.0)
    }

    pub fn is_satisfied(&self) -> bool {
        self.raw_remaining_irw() <= 0.0 && self.raw_remaining_fw() <= 0.0
    }
}

/// Volume flowing to products from stands disturbed before HAT ran.
pub fn produced_volumes(stands: &[Stand], inputs: &PotentialInputs<'_>) -> Result<ProductVolumes> {
    let mut total = ProductVolumes::default();
    for stand in stands {
        let Some(disturbance_id) = stand.disturbance_id else {
            continue;
        };
        let coefs = inputs.stand_coefficients(stand)?;
        let fractions = inputs.irw_fractions.lookup(&stand.classifiers, disturbance_id)?;
        total += inputs
            .converter
            .split_volumes(&stand.to_product, fractions, coefs);
    }
    Ok(total)
}

pub fn reconcile(year: i32, demand: &Demand, produced: ProductVolumes) -> Result<DemandBalance> {
    Ok(DemandBalance {
        year,
        demand: ProductVolumes {
            irw: demand.volume(Product::Irw, year)?,
            fw: demand.volume(Product::Fw, year)?,
        },
        produced,
    })
}
