pub mod classifier;
pub mod coefficients;
pub mod skew;
pub mod stand;
pub mod template;
