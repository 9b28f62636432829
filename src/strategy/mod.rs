pub mod allocation;
pub mod eligibility;
pub mod implementations;
pub mod materialize;
pub mod potential;
pub mod reconcile;
pub mod traits;
pub mod units;
