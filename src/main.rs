//! IoT Wi-Fi energy simulator.
//!
//! Runs one access point and its stations through a deterministic
//! discrete-event simulation and prints per-flow traffic statistics and
//! per-device energy consumption.
//!
//! # Example
//!
//! ```bash
//! # Reference scenario: 10 devices, 60 s, 20 dBm, 10 kJ per device
//! iot-wifi-energy-simulator
//!
//! # Smaller batteries, lower power, JSON report next to the text output
//! iot-wifi-energy-simulator --tx-power 10 --initial-energy 0.05 --report-json report.json
//!
//! # Everything from a file, with a command-line override on top
//! iot-wifi-energy-simulator --config scenario.toml --n-devices 20
//! ```

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info, warn};
use std::path::PathBuf;

mod common;
mod simulation;

use common::config::SimulationConfig;
use common::report::{format_report, write_json};
use simulation::Simulation;

/// IoT Wi-Fi energy simulator
///
/// Command-line values override the configuration file, which overrides the
/// built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "iot-wifi-energy-simulator")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of devices, access point included
    #[arg(long)]
    n_devices: Option<u32>,

    /// Simulation time in seconds
    #[arg(long)]
    simulation_time: Option<f64>,

    /// Transmit power in dBm
    #[arg(long)]
    tx_power: Option<f64>,

    /// Initial energy per device in Joules (`inf` for unlimited)
    #[arg(long)]
    initial_energy: Option<f64>,

    /// Accepted for compatibility; packet capture is not supported
    #[arg(long)]
    enable_pcap: bool,

    /// Also write the report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut SimulationConfig) {
        if let Some(n_devices) = self.n_devices {
            config.n_devices = n_devices;
        }
        if let Some(simulation_time) = self.simulation_time {
            config.simulation_time_s = simulation_time;
        }
        if let Some(tx_power) = self.tx_power {
            config.tx_power_dbm = tx_power;
        }
        if let Some(initial_energy) = self.initial_energy {
            config.initial_energy_j = initial_energy;
        }
        config.enable_pcap |= self.enable_pcap;
    }
}

fn main() -> anyhow::Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("iot_wifi_energy_simulator"), LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SimulationConfig::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => SimulationConfig::default(),
    };
    args.apply(&mut config);
    if config.application.stop_s.is_none() && config.simulation_time_s <= config.application.start_s + 1.0 {
        warn!(
            "Simulation time {} s leaves no room for client traffic starting at {} s",
            config.simulation_time_s, config.application.start_s
        );
    }

    let mut simulation = Simulation::new(config).context("Failed to set up simulation")?;
    let report = simulation.run().context("Simulation aborted")?;

    print!("{}", format_report(&report).context("Failed to format report")?);

    if let Some(path) = &args.report_json {
        write_json(&report, path)?;
        info!("JSON report written to {}", path.display());
    }

    Ok(())
}
