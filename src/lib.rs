//! Harvest Allocation Tool.
//!
//! Plugs into a forest carbon simulation and, at every timestep, synthesizes
//! the harvest events needed for removals to match the yearly demand for
//! industrial roundwood and fuelwood.

pub mod error;
pub mod io;
pub mod model;
pub mod simulation;
pub mod strategy;

pub use error::{HatError, Result};
