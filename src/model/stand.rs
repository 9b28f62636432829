// src/model/stand.rs

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// The eight carbon pools harvest removals are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarbonSource {
    SoftwoodMerch,
    HardwoodMerch,
    SoftwoodOther,
    HardwoodOther,
    SoftwoodStemSnag,
    HardwoodStemSnag,
    SoftwoodBranchSnag,
    HardwoodBranchSnag,
}

impl CarbonSource {
    pub const ALL: [CarbonSource; 8] = [
        CarbonSource::SoftwoodMerch,
        CarbonSource::HardwoodMerch,
        CarbonSource::SoftwoodOther,
        CarbonSource::HardwoodOther,
        CarbonSource::SoftwoodStemSnag,
        CarbonSource::HardwoodStemSnag,
        CarbonSource::SoftwoodBranchSnag,
        CarbonSource::HardwoodBranchSnag,
    ];

    /// Column name used by every input table.
    pub fn column(self) -> &'static str {
        match self {
            CarbonSource::SoftwoodMerch => "softwood_merch",
            CarbonSource::HardwoodMerch => "hardwood_merch",
            CarbonSource::SoftwoodOther => "softwood_other",
            CarbonSource::HardwoodOther => "hardwood_other",
            CarbonSource::SoftwoodStemSnag => "softwood_stem_snag",
            CarbonSource::HardwoodStemSnag => "hardwood_stem_snag",
            CarbonSource::SoftwoodBranchSnag => "softwood_branch_snag",
            CarbonSource::HardwoodBranchSnag => "hardwood_branch_snag",
        }
    }

    pub fn is_snag(self) -> bool {
        matches!(
            self,
            CarbonSource::SoftwoodStemSnag
                | CarbonSource::HardwoodStemSnag
                | CarbonSource::SoftwoodBranchSnag
                | CarbonSource::HardwoodBranchSnag
        )
    }

    pub fn is_merch(self) -> bool {
        matches!(self, CarbonSource::SoftwoodMerch | CarbonSource::HardwoodMerch)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One value per carbon source (carbon stocks, fluxes, proportions or fractions).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourcePools([f64; 8]);

impl SourcePools {
    pub fn uniform(value: f64) -> Self {
        Self([value; 8])
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.map(|v| v * factor))
    }

    pub fn iter(&self) -> impl Iterator<Item = (CarbonSource, f64)> + '_ {
        CarbonSource::ALL.iter().map(move |&s| (s, self[s]))
    }
}

impl Index<CarbonSource> for SourcePools {
    type Output = f64;

    fn index(&self, source: CarbonSource) -> &f64 {
        &self.0[source.index()]
    }
}

impl IndexMut<CarbonSource> for SourcePools {
    fn index_mut(&mut self, source: CarbonSource) -> &mut f64 {
        &mut self.0[source.index()]
    }
}

/// Snapshot of one stand group at the end of a (hypothetical) timestep.
///
/// Carbon and fluxes are totals for the group (tonnes of carbon), not
/// per hectare.
#[derive(Debug, Clone, PartialEq)]
pub struct Stand {
    pub classifiers: Vec<String>,
    pub area: f64,
    pub age: u32,
    pub time_since_last_disturbance: u32,
    pub last_disturbance_id: Option<u32>,
    /// Disturbance applied during the current timestep.
    pub disturbance_id: Option<u32>,
    pub carbon: SourcePools,
    pub to_product: SourcePools,
}

impl Stand {
    pub fn is_disturbed(&self) -> bool {
        self.disturbance_id.is_some()
    }
}
