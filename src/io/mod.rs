pub mod demand;
pub mod inputs;
pub mod reporting;
pub mod table;
