//! Error types for the simulation engine.
//!
//! Only caller bugs and misconfiguration are errors. Lost packets and depleted
//! devices are normal simulated outcomes and are recorded in the data model.

use std::time::Duration;
use thiserror::Error;

use super::types::{DeviceId, SimTime};
use crate::common::config::ConfigError;

/// Errors that abort a simulation run.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// An event was scheduled before the current simulated time.
    #[error("cannot schedule event at {requested}: clock is already at {now}")]
    InvalidTime { now: SimTime, requested: SimTime },

    /// A delay pushed the fire time past the end of representable time.
    #[error("cannot schedule event {delay:?} after {now}: time overflows")]
    TimeOverflow { now: SimTime, delay: Duration },

    /// An event referenced a device that does not exist.
    #[error("event references unknown device {0}")]
    UnknownDevice(DeviceId),

    /// Setup rejected the configuration before any simulated time advanced.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
}
