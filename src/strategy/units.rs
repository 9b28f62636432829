// src/strategy/units.rs

//! Conversions between carbon mass and wood volume.
//!
//! `volume = mass × (1 − bark_frac) / (carbon_fraction × wood_density)`,
//! where the carbon fraction of dry biomass is a scenario constant.

use crate::model::coefficients::WoodCoefficients;
use crate::model::stand::SourcePools;

/// Carbon content of oven-dry biomass.
pub const DEFAULT_CARBON_FRACTION: f64 = 0.49;

/// IRW and FW volumes (m3) derived from the same carbon flux.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProductVolumes {
    pub irw: f64,
    pub fw: f64,
}

impl std::ops::AddAssign for ProductVolumes {
    fn add_assign(&mut self, rhs: Self) {
        self.irw += rhs.irw;
        self.fw += rhs.fw;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    carbon_fraction: f64,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new(DEFAULT_CARBON_FRACTION)
    }
}

impl UnitConverter {
    pub fn new(carbon_fraction: f64) -> Self {
        Self { carbon_fraction }
    }

    /// Tonnes of carbon to cubic metres of wood under bark removed.
    pub fn mass_to_volume(&self, mass: f64, coefs: WoodCoefficients) -> f64 {
        mass * (1.0 - coefs.bark_frac) / (self.carbon_fraction * coefs.wood_density)
    }

    pub fn volume_to_mass(&self, volume: f64, coefs: WoodCoefficients) -> f64 {
        volume * (self.carbon_fraction * coefs.wood_density) / (1.0 - coefs.bark_frac)
    }

    /// Splits a per-source carbon flux into IRW and FW volumes.
    ///
    /// `irw_fractions` gives, per source, the share going to roundwood; the
    /// complement goes to fuelwood.
    pub fn split_volumes(
        &self,
        flux: &SourcePools,
        irw_fractions: &SourcePools,
        coefs: WoodCoefficients,
    ) -> ProductVolumes {
        flux.iter().fold(ProductVolumes::default(), |mut acc, (source, mass)| {
            let frac = irw_fractions[source];
            acc.irw += self.mass_to_volume(mass * frac, coefs);
            acc.fw += self.mass_to_volume(mass * (1.0 - frac), coefs);
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stand::CarbonSource;
    use approx::assert_relative_eq;

    const PINE: WoodCoefficients = WoodCoefficients {
        wood_density: 0.41,
        bark_frac: 0.12,
    };

    #[test]
    fn mass_volume_round_trip() {
        let conv = UnitConverter::default();
        for mass in [0.0, 1.0, 37.5, 12_345.678] {
            let volume = conv.mass_to_volume(mass, PINE);
            assert_relative_eq!(conv.volume_to_mass(volume, PINE), mass, max_relative = 1e-12);
        }
    }

    #[test]
    fn reference_formula() {
        let conv = UnitConverter::default();
        let volume = conv.mass_to_volume(100.0, PINE);
        assert_relative_eq!(volume, 100.0 * 0.88 / (0.49 * 0.41), max_relative = 1e-12);
    }

    #[test]
    fn split_uses_complement_for_fuelwood() {
        let conv = UnitConverter::default();
        let mut flux = SourcePools::default();
        flux[CarbonSource::SoftwoodMerch] = 10.0;
        flux[CarbonSource::SoftwoodStemSnag] = 4.0;
        let mut fractions = SourcePools::default();
        fractions[CarbonSource::SoftwoodMerch] = 0.75;
        let vols = conv.split_volumes(&flux, &fractions, PINE);
        assert_relative_eq!(vols.irw, conv.mass_to_volume(7.5, PINE), max_relative = 1e-12);
        assert_relative_eq!(vols.fw, conv.mass_to_volume(6.5, PINE), max_relative = 1e-12);
    }
}
