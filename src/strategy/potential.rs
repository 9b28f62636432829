// src/strategy/potential.rs

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{HatError, Result};
use crate::model::classifier::ClassifierPattern;
use crate::model::coefficients::{
    CoefficientTable, IrwFractionTable, ProductProportions, WoodCoefficients,
};
use crate::model::stand::{SourcePools, Stand};
use crate::model::template::{EventTemplate, ProductCreated};
use crate::strategy::eligibility::Eligible;
use crate::strategy::units::UnitConverter;

/// One allocatable disturbance opportunity of the current timestep.
///
/// Volumes are in m3. The allocation fields stay at zero until the
/// tiered allocator fills them.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub template: EventTemplate,
    pub coefs: WoodCoefficients,
    pub irw_vol: f64,
    pub fw_vol: f64,
    pub irw_avail: f64,
    pub fw_avail: f64,
    pub skew: Option<f64>,
    pub irw_norm: f64,
    pub irw_need: f64,
    pub irw_frac: f64,
    pub fw_colat: f64,
    pub fw_norm: f64,
    pub fw_need: f64,
    /// Carbon mass to remove, tonnes.
    pub amount: f64,
}

impl Candidate {
    pub fn new(template: EventTemplate, coefs: WoodCoefficients, irw_vol: f64, fw_vol: f64) -> Self {
        let bias = template.dist_interval_bias;
        Self {
            template,
            coefs,
            irw_vol,
            fw_vol,
            irw_avail: irw_vol / bias,
            fw_avail: fw_vol / bias,
            skew: None,
            irw_norm: 0.0,
            irw_need: 0.0,
            irw_frac: 0.0,
            fw_colat: 0.0,
            fw_norm: 0.0,
            fw_need: 0.0,
            amount: 0.0,
        }
    }

    pub fn disturbance_id(&self) -> u32 {
        self.template.disturbance_id
    }
}

/// Potential volume of one eligible stand under one template.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialRow {
    pub template: usize,
    pub coefs: WoodCoefficients,
    pub irw_vol: f64,
    pub fw_vol: f64,
}

/// Tables needed to turn standing carbon into potential volumes.
#[derive(Debug, Clone, Copy)]
pub struct PotentialInputs<'a> {
    pub converter: UnitConverter,
    pub proportions: &'a ProductProportions,
    pub irw_fractions: &'a IrwFractionTable,
    pub coefficients: &'a CoefficientTable,
    /// Position of the forest type among the classifiers.
    pub forest_type_index: usize,
}

impl PotentialInputs<'_> {
    pub fn stand_coefficients(&self, stand: &Stand) -> Result<WoodCoefficients> {
        let forest_type = stand
            .classifiers
            .get(self.forest_type_index)
            .map(String::as_str)
            .unwrap_or_default();
        self.coefficients.get(forest_type)
    }

    /// Volumes a disturbance would produce from the stand's standing carbon.
    pub fn potential_row(
        &self,
        stand: &Stand,
        template_index: usize,
        template: &EventTemplate,
    ) -> Result<PotentialRow> {
        let coefs = self.stand_coefficients(stand)?;
        let props = self.proportions.get(template.disturbance_id)?;
        let fractions = self
            .irw_fractions
            .lookup(&stand.classifiers, template.disturbance_id)?;
        let mut removed = SourcePools::default();
        for (source, carbon) in stand.carbon.iter() {
            removed[source] = carbon * props[source];
        }
        let vols = self.converter.split_volumes(&removed, fractions, coefs);
        Ok(PotentialRow {
            template: template_index,
            coefs,
            irw_vol: vols.irw,
            fw_vol: vols.fw,
        })
    }
}

/// Builds the candidate pool for the eligible (stand, template) pairs.
pub fn build_candidates(
    stands: &[Stand],
    templates: &[EventTemplate],
    eligible: &[Eligible],
    inputs: &PotentialInputs<'_>,
    tolerance: f64,
) -> Result<Vec<Candidate>> {
    let rows = eligible
        .iter()
        .map(|e| inputs.potential_row(&stands[e.stand], e.template, &templates[e.template]))
        .collect::<Result<Vec<_>>>()?;
    let candidates = aggregate(templates, rows, tolerance)?;
    debug!(
        eligible = eligible.len(),
        candidates = candidates.len(),
        "candidate pool built"
    );
    Ok(candidates)
}

/// Merges the age sub-buckets of each (pattern, disturbance, product) group.
///
/// Non-summed attributes must agree inside a group and the summed volumes
/// must survive the merge.
pub fn aggregate(
    templates: &[EventTemplate],
    rows: Vec<PotentialRow>,
    tolerance: f64,
) -> Result<Vec<Candidate>> {
    let before_irw: f64 = rows.iter().map(|r| r.irw_vol).sum();
    let before_fw: f64 = rows.iter().map(|r| r.fw_vol).sum();

    let mut groups: BTreeMap<(ClassifierPattern, u32, ProductCreated), Vec<PotentialRow>> =
        BTreeMap::new();
    for row in rows {
        let t = &templates[row.template];
        groups
            .entry((t.pattern.clone(), t.disturbance_id, t.product_created))
            .or_default()
            .push(row);
    }

    let mut candidates = Vec::with_capacity(groups.len());
    for ((_, disturbance_id, _), members) in groups {
        let first = &members[0];
        let template = &templates[first.template];
        for other in &members[1..] {
            if templates[other.template] != *template {
                return Err(HatError::AmbiguousCandidate {
                    disturbance_id,
                    attribute: "event template",
                });
            }
            if other.coefs.wood_density != first.coefs.wood_density {
                return Err(HatError::AmbiguousCandidate {
                    disturbance_id,
                    attribute: "wood_density",
                });
            }
            if other.coefs.bark_frac != first.coefs.bark_frac {
                return Err(HatError::AmbiguousCandidate {
                    disturbance_id,
                    attribute: "bark_frac",
                });
            }
        }
        let irw_vol = members.iter().map(|r| r.irw_vol).sum();
        let fw_vol = members.iter().map(|r| r.fw_vol).sum();
        candidates.push(Candidate::new(template.clone(), first.coefs, irw_vol, fw_vol));
    }

    let after_irw: f64 = candidates.iter().map(|c| c.irw_vol).sum();
    let after_fw: f64 = candidates.iter().map(|c| c.fw_vol).sum();
    check_preserved("irw_vol", before_irw, after_irw, tolerance)?;
    check_preserved("fw_vol", before_fw, after_fw, tolerance)?;
    Ok(candidates)
}

fn check_preserved(quantity: &'static str, before: f64, after: f64, tolerance: f64) -> Result<()> {
    if (before - after).abs() > tolerance * before.abs().max(1.0) {
        return Err(HatError::AggregationMismatch {
            quantity,
            before,
            after,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::coefficients::IrwFraction;
    use crate::model::stand::CarbonSource;
    use crate::strategy::eligibility::tests::{stand, template};
    use crate::strategy::eligibility::eligible_pairs;
    use approx::assert_relative_eq;

    const COEFS: WoodCoefficients = WoodCoefficients {
        wood_density: 0.5,
        bark_frac: 0.0,
    };

    fn row(template: usize, irw_vol: f64, fw_vol: f64) -> PotentialRow {
        PotentialRow {
            template,
            coefs: COEFS,
            irw_vol,
            fw_vol,
        }
    }

    #[test]
    fn age_buckets_merge_without_changing_totals() {
        let templates = vec![template(&["PA"], 20), template(&["QA"], 20)];
        let rows = vec![row(0, 10.0, 2.0), row(0, 30.0, 6.0), row(1, 5.0, 1.0)];
        let candidates = aggregate(&templates, rows, 0.0).unwrap();
        assert_eq!(candidates.len(), 2);
        let irw: f64 = candidates.iter().map(|c| c.irw_vol).sum();
        let fw: f64 = candidates.iter().map(|c| c.fw_vol).sum();
        assert_eq!(irw, 45.0);
        assert_eq!(fw, 9.0);
        assert_eq!(candidates[0].irw_vol, 40.0);
    }

    #[test]
    fn conflicting_templates_in_one_group_are_ambiguous() {
        let mut young = template(&["PA"], 20);
        young.sw_end = 40;
        let old = template(&["PA"], 20);
        let rows = vec![row(0, 1.0, 1.0), row(1, 1.0, 1.0)];
        let err = aggregate(&[young, old], rows, 1e-9).unwrap_err();
        assert!(matches!(err, HatError::AmbiguousCandidate { disturbance_id: 20, .. }));
    }

    #[test]
    fn availability_is_annualized() {
        let mut t = template(&["PA"], 20);
        t.dist_interval_bias = 4.0;
        let candidate = Candidate::new(t, COEFS, 100.0, 20.0);
        assert_eq!(candidate.irw_avail, 25.0);
        assert_eq!(candidate.fw_avail, 5.0);
    }

    #[test]
    fn potential_volume_from_standing_carbon() {
        let mut s = stand(&["PA"], 60);
        s.carbon[CarbonSource::SoftwoodMerch] = 100.0;
        s.carbon[CarbonSource::SoftwoodOther] = 20.0;
        let templates = vec![template(&["PA"], 20)];

        let mut props = SourcePools::default();
        props[CarbonSource::SoftwoodMerch] = 0.9;
        props[CarbonSource::SoftwoodOther] = 0.5;
        let proportions = ProductProportions::new([(20, props)]);
        let mut fractions = SourcePools::default();
        fractions[CarbonSource::SoftwoodMerch] = 0.8;
        let irw_fractions = IrwFractionTable::new(vec![IrwFraction {
            pattern: ClassifierPattern::parse(&["?"]),
            disturbance_id: 20,
            fractions,
        }]);
        let coefficients = CoefficientTable::new([("PA".to_string(), COEFS)]);
        let inputs = PotentialInputs {
            converter: UnitConverter::default(),
            proportions: &proportions,
            irw_fractions: &irw_fractions,
            coefficients: &coefficients,
            forest_type_index: 0,
        };

        let stands = vec![s];
        let pairs = eligible_pairs(&stands, &templates);
        let candidates = build_candidates(&stands, &templates, &pairs, &inputs, 1e-9).unwrap();
        assert_eq!(candidates.len(), 1);
        let conv = UnitConverter::default();
        assert_relative_eq!(candidates[0].irw_vol, conv.mass_to_volume(72.0, COEFS), max_relative = 1e-12);
        assert_relative_eq!(candidates[0].fw_vol, conv.mass_to_volume(28.0, COEFS), max_relative = 1e-12);
    }
}
