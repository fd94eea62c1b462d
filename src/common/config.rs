//! Simulation configuration loading and validation.
//!
//! Contains all parameters of a run: network size, radio and energy
//! constants, topology, application traffic and beacons. Every field has a
//! default matching the reference IoT scenario, so a TOML file only needs to
//! name what it changes. Command-line overrides are applied on top by `main`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::simulation::energy::EnergyParameters;
use crate::simulation::signal_calculations::{PathLossParameters, PhyParameters, frame_air_time_secs};
use crate::simulation::types::Point;

/// Error type for configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("the network needs at least one device (the access point)")]
    ZeroDevices,

    #[error("explicit topology lists {found} devices but n_devices is {expected}")]
    TopologyMismatch { expected: u32, found: usize },
}

/// Row-first grid placement. Device `i` is at column `i % grid_width`, row `i / grid_width`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridLayout {
    pub origin: Point,
    pub delta_x: f64,
    pub delta_y: f64,
    pub grid_width: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        GridLayout {
            origin: Point::new(0.0, 0.0),
            delta_x: 2.0,
            delta_y: 2.0,
            grid_width: 3,
        }
    }
}

/// Uniform placement in `[0, width) x [0, height)`, reproducible through `seed`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RandomLayout {
    pub seed: u64,
    pub width: f64,
    pub height: f64,
}

impl Default for RandomLayout {
    fn default() -> Self {
        RandomLayout {
            seed: 1,
            width: 50.0,
            height: 50.0,
        }
    }
}

/// One device of an explicit topology. Unset fields fall back to the global values.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DevicePlacement {
    pub position: Point,
    #[serde(default)]
    pub tx_power_dbm: Option<f64>,
    #[serde(default)]
    pub initial_energy_j: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ExplicitLayout {
    /// Device 0 is the access point.
    pub devices: Vec<DevicePlacement>,
}

/// Where devices are placed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyConfig {
    Grid(GridLayout),
    Random(RandomLayout),
    Explicit(ExplicitLayout),
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig::Grid(GridLayout::default())
    }
}

/// UDP echo clients on every station and the echo server on the access point.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Maximum number of requests each client sends.
    pub packet_count: u32,
    pub interval_s: f64,
    /// Payload size in bytes.
    pub packet_size: u32,
    pub start_s: f64,
    /// Client stop time. Defaults to one second before the end of the run.
    pub stop_s: Option<f64>,
    /// Echo server port on the access point.
    pub echo_port: u16,
    /// Whether the server answers each request.
    pub echo_replies: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            packet_count: 100,
            interval_s: 5.0,
            packet_size: 100,
            start_s: 1.0,
            stop_s: None,
            echo_port: 9,
            echo_replies: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub enabled: bool,
    pub interval_s: f64,
    pub size_bytes: u32,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        BeaconConfig {
            enabled: true,
            interval_s: 2.56,
            size_bytes: 100,
        }
    }
}

/// Root structure representing a whole run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total device count, access point included.
    pub n_devices: u32,
    pub simulation_time_s: f64,
    pub tx_power_dbm: f64,
    /// Budget of every device in Joules. `inf` disables depletion.
    pub initial_energy_j: f64,
    /// Accepted for compatibility, packet capture is not supported.
    pub enable_pcap: bool,
    /// Time a packet may stay in flight before it is declared lost.
    pub delivery_window_s: f64,
    pub energy: EnergyParameters,
    pub path_loss: PathLossParameters,
    pub phy: PhyParameters,
    pub topology: TopologyConfig,
    pub application: ApplicationConfig,
    pub beacon: BeaconConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            n_devices: 10,
            simulation_time_s: 60.0,
            tx_power_dbm: 20.0,
            initial_energy_j: 10_000.0,
            enable_pcap: false,
            delivery_window_s: 10.0,
            energy: EnergyParameters::default(),
            path_loss: PathLossParameters::default(),
            phy: PhyParameters::default(),
            topology: TopologyConfig::default(),
            application: ApplicationConfig::default(),
            beacon: BeaconConfig::default(),
        }
    }
}

/// Longest accepted time value in seconds (about 31 years of simulated time).
///
/// Keeps every sum the scheduler forms (stop time plus delivery window, last
/// send plus airtime) far inside the range of `Duration`.
pub const MAX_TIME_S: f64 = 1.0e9;

/// Largest accepted coordinate magnitude in meters.
pub const MAX_COORDINATE_M: f64 = 1.0e7;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be a positive finite number", value)))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be a non-negative finite number", value)))
    }
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be finite", value)))
    }
}

fn require_duration(field: &'static str, secs: f64) -> Result<(), ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|err| invalid(field, format!("{} s is not a valid duration: {}", secs, err)))?;
    if secs > MAX_TIME_S {
        return Err(invalid(field, format!("{} s exceeds the {} s limit", secs, MAX_TIME_S)));
    }
    Ok(())
}

fn require_coordinate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value.abs() <= MAX_COORDINATE_M {
        Ok(())
    } else {
        Err(invalid(field, format!("{} m must be finite and within {} m of the origin", value, MAX_COORDINATE_M)))
    }
}

// Infinity is a valid budget, NaN and negatives are not.
fn require_budget(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} J must be non-negative", value)))
    }
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the TOML file
    ///
    /// # Returns
    /// * `Ok(SimulationConfig)` with defaults for every field the file leaves out
    /// * `Err(ConfigError)` if the file cannot be read or parsed
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Run length. Only meaningful once [`validate`](Self::validate) has accepted the configuration.
    pub fn simulation_time(&self) -> Duration {
        Duration::from_secs_f64(self.simulation_time_s)
    }

    /// Only meaningful once [`validate`](Self::validate) has accepted the configuration.
    pub fn delivery_window(&self) -> Duration {
        Duration::from_secs_f64(self.delivery_window_s)
    }

    /// Effective client stop time in seconds.
    pub fn client_stop_s(&self) -> f64 {
        self.application.stop_s.unwrap_or(self.simulation_time_s - 1.0)
    }

    /// Transmit power of device `index`, honoring explicit per-device overrides.
    pub fn device_tx_power(&self, index: usize) -> f64 {
        self.placement(index)
            .and_then(|p| p.tx_power_dbm)
            .unwrap_or(self.tx_power_dbm)
    }

    /// Energy budget of device `index`, honoring explicit per-device overrides.
    pub fn device_initial_energy(&self, index: usize) -> f64 {
        self.placement(index)
            .and_then(|p| p.initial_energy_j)
            .unwrap_or(self.initial_energy_j)
    }

    fn placement(&self, index: usize) -> Option<&DevicePlacement> {
        match &self.topology {
            TopologyConfig::Explicit(layout) => layout.devices.get(index),
            _ => None,
        }
    }

    /// Validate the configuration before any simulated time advances.
    ///
    /// Non-physical values are rejected, never corrected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_devices == 0 {
            return Err(ConfigError::ZeroDevices);
        }
        require_positive("simulation_time_s", self.simulation_time_s)?;
        require_duration("simulation_time_s", self.simulation_time_s)?;
        require_finite("tx_power_dbm", self.tx_power_dbm)?;
        require_budget("initial_energy_j", self.initial_energy_j)?;
        require_positive("delivery_window_s", self.delivery_window_s)?;
        require_duration("delivery_window_s", self.delivery_window_s)?;

        require_non_negative("energy.tx_current_a", self.energy.tx_current_a)?;
        require_non_negative("energy.rx_current_a", self.energy.rx_current_a)?;
        require_non_negative("energy.idle_current_a", self.energy.idle_current_a)?;
        require_positive("energy.supply_voltage_v", self.energy.supply_voltage_v)?;

        require_positive("path_loss.path_loss_exponent", self.path_loss.path_loss_exponent)?;
        require_finite("path_loss.path_loss_at_reference_distance", self.path_loss.path_loss_at_reference_distance)?;
        require_positive("path_loss.reference_distance", self.path_loss.reference_distance)?;
        require_finite("path_loss.tx_gain_db", self.path_loss.tx_gain_db)?;
        require_finite("path_loss.rx_gain_db", self.path_loss.rx_gain_db)?;
        require_finite("path_loss.noise_figure_db", self.path_loss.noise_figure_db)?;
        require_positive("path_loss.channel_bandwidth_hz", self.path_loss.channel_bandwidth_hz)?;
        require_finite("path_loss.min_snr_db", self.path_loss.min_snr_db)?;
        if let Some(floor) = self.path_loss.noise_floor {
            require_finite("path_loss.noise_floor", floor)?;
        }

        require_positive("phy.data_rate_mbps", self.phy.data_rate_mbps)?;
        require_non_negative("phy.preamble_us", self.phy.preamble_us)?;

        require_positive("application.interval_s", self.application.interval_s)?;
        require_duration("application.interval_s", self.application.interval_s)?;
        require_duration("application.start_s", self.application.start_s)?;
        if let Some(stop) = self.application.stop_s {
            require_duration("application.stop_s", stop)?;
        }
        if self.application.packet_size == 0 {
            return Err(invalid("application.packet_size", "packets must carry at least one byte"));
        }
        let largest_frame = u64::from(self.application.packet_size) + u64::from(self.phy.overhead_bytes);
        require_duration("phy", frame_air_time_secs(&self.phy, largest_frame))?;

        if self.beacon.enabled {
            require_positive("beacon.interval_s", self.beacon.interval_s)?;
            require_duration("beacon.interval_s", self.beacon.interval_s)?;
            require_duration("beacon.size_bytes", frame_air_time_secs(&self.phy, u64::from(self.beacon.size_bytes)))?;
        }

        match &self.topology {
            TopologyConfig::Grid(grid) => {
                if grid.grid_width == 0 {
                    return Err(invalid("topology.grid_width", "must be at least 1"));
                }
                require_coordinate("topology.origin", grid.origin.x)?;
                require_coordinate("topology.origin", grid.origin.y)?;
                require_finite("topology.delta_x", grid.delta_x)?;
                require_finite("topology.delta_y", grid.delta_y)?;
                let columns = self.n_devices.min(grid.grid_width) - 1;
                let rows = (self.n_devices - 1) / grid.grid_width;
                require_coordinate("topology.delta_x", grid.origin.x + grid.delta_x * f64::from(columns))?;
                require_coordinate("topology.delta_y", grid.origin.y + grid.delta_y * f64::from(rows))?;
            }
            TopologyConfig::Random(area) => {
                require_positive("topology.width", area.width)?;
                require_positive("topology.height", area.height)?;
                require_coordinate("topology.width", area.width)?;
                require_coordinate("topology.height", area.height)?;
            }
            TopologyConfig::Explicit(layout) => {
                if layout.devices.len() != self.n_devices as usize {
                    return Err(ConfigError::TopologyMismatch {
                        expected: self.n_devices,
                        found: layout.devices.len(),
                    });
                }
                for device in &layout.devices {
                    require_coordinate("topology.devices.position", device.position.x)?;
                    require_coordinate("topology.devices.position", device.position.y)?;
                    if let Some(power) = device.tx_power_dbm {
                        require_finite("topology.devices.tx_power_dbm", power)?;
                    }
                    if let Some(budget) = device.initial_energy_j {
                        require_budget("topology.devices.initial_energy_j", budget)?;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_reference_scenario() {
        let config = SimulationConfig::default();
        assert_eq!(config.n_devices, 10);
        assert_eq!(config.simulation_time_s, 60.0);
        assert_eq!(config.tx_power_dbm, 20.0);
        assert_eq!(config.initial_energy_j, 10_000.0);
        assert_eq!(config.client_stop_s(), 59.0);
        assert_eq!(config.beacon.interval_s, 2.56);
        assert_eq!(config.topology, TopologyConfig::Grid(GridLayout::default()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = write_config(
            r#"
n_devices = 5
initial_energy_j = inf

[application]
packet_count = 10
"#,
        );
        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.n_devices, 5);
        assert!(config.initial_energy_j.is_infinite());
        assert_eq!(config.application.packet_count, 10);
        assert_eq!(config.application.interval_s, 5.0);
        assert_eq!(config.tx_power_dbm, 20.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_topology_with_overrides() {
        let file = write_config(
            r#"
n_devices = 2

[topology]
kind = "explicit"

[[topology.devices]]
position = { x = 0.0, y = 0.0 }

[[topology.devices]]
position = { x = 1000.0, y = 0.0 }
tx_power_dbm = 10.0
initial_energy_j = 0.5
"#,
        );
        let config = SimulationConfig::load(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.device_tx_power(0), 20.0);
        assert_eq!(config.device_tx_power(1), 10.0);
        assert_eq!(config.device_initial_energy(1), 0.5);
        assert_eq!(config.device_initial_energy(0), 10_000.0);
    }

    #[test]
    fn random_topology_parses() {
        let file = write_config(
            r#"
[topology]
kind = "random"
seed = 42
width = 30.0
"#,
        );
        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(
            config.topology,
            TopologyConfig::Random(RandomLayout {
                seed: 42,
                width: 30.0,
                height: 50.0,
            })
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SimulationConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let file = write_config("n_devices = \"ten\"");
        let err = SimulationConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_non_physical_values() {
        let zero = SimulationConfig {
            n_devices: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::ZeroDevices)));

        let negative_energy = SimulationConfig {
            initial_energy_j: -1.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            negative_energy.validate(),
            Err(ConfigError::Invalid { field: "initial_energy_j", .. })
        ));

        let mut bad_exponent = SimulationConfig::default();
        bad_exponent.path_loss.path_loss_exponent = 0.0;
        assert!(bad_exponent.validate().is_err());

        let mut bad_interval = SimulationConfig::default();
        bad_interval.application.interval_s = 0.0;
        assert!(bad_interval.validate().is_err());

        let no_time = SimulationConfig {
            simulation_time_s: f64::NAN,
            ..SimulationConfig::default()
        };
        assert!(no_time.validate().is_err());
    }

    #[test]
    fn rejects_durations_beyond_the_clock_range() {
        let endless = SimulationConfig {
            simulation_time_s: 1e20,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            endless.validate(),
            Err(ConfigError::Invalid { field: "simulation_time_s", .. })
        ));

        let mut sparse = SimulationConfig::default();
        sparse.application.interval_s = 1e20;
        assert!(matches!(
            sparse.validate(),
            Err(ConfigError::Invalid { field: "application.interval_s", .. })
        ));

        let mut late_stop = SimulationConfig::default();
        late_stop.application.stop_s = Some(f64::INFINITY);
        assert!(matches!(
            late_stop.validate(),
            Err(ConfigError::Invalid { field: "application.stop_s", .. })
        ));

        let long_window = SimulationConfig {
            delivery_window_s: 2.0 * MAX_TIME_S,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            long_window.validate(),
            Err(ConfigError::Invalid { field: "delivery_window_s", .. })
        ));

        let mut slow_beacons = SimulationConfig::default();
        slow_beacons.beacon.interval_s = 1e300;
        assert!(matches!(
            slow_beacons.validate(),
            Err(ConfigError::Invalid { field: "beacon.interval_s", .. })
        ));

        let at_limit = SimulationConfig {
            simulation_time_s: MAX_TIME_S,
            ..SimulationConfig::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn rejects_airtime_and_distances_beyond_range() {
        let mut slow_phy = SimulationConfig::default();
        slow_phy.phy.data_rate_mbps = 1e-300;
        assert!(matches!(slow_phy.validate(), Err(ConfigError::Invalid { field: "phy", .. })));

        let mut long_preamble = SimulationConfig::default();
        long_preamble.phy.preamble_us = 1e30;
        assert!(matches!(long_preamble.validate(), Err(ConfigError::Invalid { field: "phy", .. })));

        let far = SimulationConfig {
            n_devices: 2,
            topology: TopologyConfig::Explicit(ExplicitLayout {
                devices: [0.0, 1e300]
                    .into_iter()
                    .map(|x| DevicePlacement {
                        position: Point::new(x, 0.0),
                        tx_power_dbm: None,
                        initial_energy_j: None,
                    })
                    .collect(),
            }),
            ..SimulationConfig::default()
        };
        assert!(matches!(
            far.validate(),
            Err(ConfigError::Invalid { field: "topology.devices.position", .. })
        ));

        let wide_grid = SimulationConfig {
            topology: TopologyConfig::Grid(GridLayout {
                delta_x: 1e300,
                ..GridLayout::default()
            }),
            ..SimulationConfig::default()
        };
        assert!(matches!(
            wide_grid.validate(),
            Err(ConfigError::Invalid { field: "topology.delta_x", .. })
        ));
    }

    #[test]
    fn explicit_topology_must_match_device_count() {
        let config = SimulationConfig {
            n_devices: 3,
            topology: TopologyConfig::Explicit(ExplicitLayout {
                devices: vec![DevicePlacement {
                    position: Point::new(0.0, 0.0),
                    tx_power_dbm: None,
                    initial_energy_j: None,
                }],
            }),
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TopologyMismatch { expected: 3, found: 1 })
        ));
    }
}
