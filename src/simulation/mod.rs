//! Discrete-event simulation core.
//!
//! This module models one access point and its stations on a shared channel
//! and integrates:
//! - A simulated clock with a deterministic event queue
//! - Log-distance propagation and a noise-floor receivability threshold
//! - Per-device radio state machines and energy budgets
//! - Periodic UDP echo traffic with per-flow packet bookkeeping
//! - A pure statistics reduction at the end of the run
//!
//! ## Module Organization
//!
//! - `types`: Core data structures (time, devices, flows, events)
//! - `event_queue`: Scheduler and the `EventHandler` seam
//! - `signal_calculations`: Path loss, noise floor, airtime and delay
//! - `geometry`: Distances and device placement
//! - `radio`, `energy`, `device`: Per-device models
//! - `traffic`, `flow_monitor`: Traffic generation and packet outcomes
//! - `statistics`: Per-flow, per-device and global metrics
//! - `network`: Setup and event handlers tying everything together
//!
//! ## Public API
//!
//! Build a [`Simulation`] from a configuration and call [`Simulation::run`]
//! to get a [`statistics::SimulationReport`].

pub mod device;
pub mod energy;
pub mod error;
pub mod event_queue;
pub mod flow_monitor;
pub mod geometry;
pub mod network;
pub mod radio;
pub mod signal_calculations;
pub mod statistics;
pub mod traffic;
pub mod types;

pub use network::Simulation;
