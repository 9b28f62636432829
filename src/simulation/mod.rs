pub mod batch;
pub mod config;
pub mod engine;
pub mod inventory;
pub mod runner;
