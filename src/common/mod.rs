//! Configuration and report output shared by the binary and the simulation core.

pub mod config;
pub mod report;
