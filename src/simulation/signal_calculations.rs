//! Radio signal and timing calculations.
//!
//! Contains helpers for:
//! - Log-distance path loss with a clamped reference distance
//! - Received power and the deterministic receivability threshold
//! - Thermal noise floor from channel bandwidth and receiver noise figure
//! - Constant-speed propagation delay and OFDM frame airtime
//! - Effective communication distance estimation given a simple link budget
//!
//! Units:
//! - Power: dBm (mW conversion provided for logging)
//! - Time: seconds (f64) for mathematical expressions, `Duration` for the scheduler
//! - Distance: meters

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::geometry::distance;
use super::types::Point;

/// Speed of light in vacuum (m/s), used by the constant-speed delay model.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Thermal noise power spectral density at 290 K (dBm/Hz).
const THERMAL_NOISE_DBM_PER_HZ: f64 = -174.0;

/// Parameters defining the radio channel propagation model.
///
/// These constants drive the log-distance path loss model and the receiver's
/// noise floor. No shadowing or fading term exists: for fixed positions and
/// powers the channel is fully deterministic.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PathLossParameters {
    /// Path loss exponent (n).
    ///
    /// - n = 2.0: Free space
    /// - n = 2.7 to 3.5: Urban areas
    /// - n = 3.0 to 5.0: Indoor obstructed environments
    pub path_loss_exponent: f64,

    /// Path loss at the reference distance d₀ in dB (46.7 dB for 5 GHz at 1 m).
    pub path_loss_at_reference_distance: f64,

    /// Reference distance d₀ in meters. Shorter distances are clamped to it.
    pub reference_distance: f64,

    /// Transmit antenna gain in dB.
    pub tx_gain_db: f64,

    /// Receive antenna gain in dB.
    pub rx_gain_db: f64,

    /// Receiver noise figure in dB.
    pub noise_figure_db: f64,

    /// Channel bandwidth in Hz, used for the thermal noise floor.
    pub channel_bandwidth_hz: f64,

    /// Explicit noise floor in dBm. When absent the floor is derived from
    /// bandwidth and noise figure.
    pub noise_floor: Option<f64>,

    /// Minimum SNR in dB above the noise floor for a frame to be decoded.
    pub min_snr_db: f64,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        PathLossParameters {
            path_loss_exponent: 3.0,
            path_loss_at_reference_distance: 46.7,
            reference_distance: 1.0,
            tx_gain_db: 0.0,
            rx_gain_db: 0.0,
            noise_figure_db: 7.0,
            channel_bandwidth_hz: 20e6,
            noise_floor: None,
            min_snr_db: 0.0,
        }
    }
}

/// PHY timing parameters used to compute frame airtime.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PhyParameters {
    /// Data rate in Mbit/s (OFDM 6 Mbit/s by default).
    pub data_rate_mbps: f64,
    /// PLCP preamble plus header duration in microseconds.
    pub preamble_us: f64,
    /// MAC header, FCS, LLC/SNAP, IPv4 and UDP header bytes added to every payload.
    pub overhead_bytes: u32,
}

impl Default for PhyParameters {
    fn default() -> Self {
        PhyParameters {
            data_rate_mbps: 6.0,
            preamble_us: 20.0,
            overhead_bytes: 64,
        }
    }
}

/// Calculate the path loss (in dB) between two positions using a log-distance model.
///
/// # Formula
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d / d₀)
/// ```
///
/// # Parameters
///
/// - `tx_position`, `rx_position`: Euclidean positions in meters
/// - `exponent`: Path loss exponent `n`
/// - `reference_loss_db`: `PL(d₀)`
/// - `reference_distance`: `d₀`; distances below it are clamped so the loss never diverges
///
/// # Returns
///
/// Path loss in decibels (dB), never lower than `reference_loss_db`.
pub fn path_loss(tx_position: &Point, rx_position: &Point, exponent: f64, reference_loss_db: f64, reference_distance: f64) -> f64 {
    let d = distance(tx_position, rx_position).max(reference_distance);
    reference_loss_db + 10.0 * exponent * (d / reference_distance).log10()
}

/// Path loss between two positions with the configured channel parameters.
pub fn path_loss_with(tx_position: &Point, rx_position: &Point, params: &PathLossParameters) -> f64 {
    path_loss(
        tx_position,
        rx_position,
        params.path_loss_exponent,
        params.path_loss_at_reference_distance,
        params.reference_distance,
    )
}

/// Received power (dBm) from transmit power, path loss and receiver gain.
///
/// Formula: P_rx = P_tx - PL + G_rx
pub fn received_power(tx_power_dbm: f64, loss_db: f64, rx_gain_db: f64) -> f64 {
    tx_power_dbm - loss_db + rx_gain_db
}

/// Deterministic delivery decision: the frame is received iff its power
/// reaches the noise floor (or receiving limit).
pub fn is_receivable(rx_power_dbm: f64, noise_floor_dbm: f64) -> bool {
    rx_power_dbm >= noise_floor_dbm
}

/// Thermal noise floor in dBm.
///
/// ```text
/// N = -174 dBm/Hz + 10 × log₁₀(B) + NF
/// ```
///
/// 20 MHz with a 7 dB noise figure gives roughly -94 dBm.
pub fn thermal_noise_floor(bandwidth_hz: f64, noise_figure_db: f64) -> f64 {
    THERMAL_NOISE_DBM_PER_HZ + 10.0 * bandwidth_hz.log10() + noise_figure_db
}

/// Noise floor in effect: the explicit override if configured, else the thermal floor.
pub fn noise_floor(params: &PathLossParameters) -> f64 {
    params
        .noise_floor
        .unwrap_or_else(|| thermal_noise_floor(params.channel_bandwidth_hz, params.noise_figure_db))
}

/// Lowest received power (dBm) that still decodes: noise floor plus the SNR margin.
pub fn receiving_limit(params: &PathLossParameters) -> f64 {
    noise_floor(params) + params.min_snr_db
}

/// Received power (dBm) at `rx_position` for a transmitter at `tx_position`.
pub fn link_rx_power(tx_position: &Point, rx_position: &Point, tx_power_dbm: f64, params: &PathLossParameters) -> f64 {
    let loss = path_loss_with(tx_position, rx_position, params);
    received_power(tx_power_dbm + params.tx_gain_db, loss, params.rx_gain_db)
}

/// Whether a frame sent from `tx_position` at `tx_power_dbm` decodes at `rx_position`.
pub fn link_is_receivable(tx_position: &Point, rx_position: &Point, tx_power_dbm: f64, params: &PathLossParameters) -> bool {
    is_receivable(link_rx_power(tx_position, rx_position, tx_power_dbm, params), receiving_limit(params))
}

/// Constant-speed propagation delay between two positions.
pub fn propagation_delay(tx_position: &Point, rx_position: &Point) -> Duration {
    Duration::from_secs_f64(distance(tx_position, rx_position) / SPEED_OF_LIGHT)
}

/// Time on air for a payload of `payload_size` bytes.
///
/// ```text
/// T = T_preamble + 8 × (payload + overhead) / rate
/// ```
pub fn calculate_air_time(phy: &PhyParameters, payload_size: u32) -> Duration {
    frame_air_time(phy, u64::from(payload_size) + u64::from(phy.overhead_bytes))
}

/// Time on air for a complete MAC frame of `frame_size` bytes (no upper-layer overhead added).
///
/// The PHY parameters must have been validated so that the result fits a `Duration`.
pub fn frame_air_time(phy: &PhyParameters, frame_size: u64) -> Duration {
    Duration::from_secs_f64(frame_air_time_secs(phy, frame_size))
}

/// Airtime in seconds, unchecked. Configuration validation bounds it before any `Duration` is built.
pub fn frame_air_time_secs(phy: &PhyParameters, frame_size: u64) -> f64 {
    let bits = 8.0 * frame_size as f64;
    phy.preamble_us * 1e-6 + bits / (phy.data_rate_mbps * 1e6)
}

// Estimate the distance at which received power drops to the receiving limit.
// Solving P_tx + G_tx + G_rx - (PL0 + 10 n log10(d / d0)) = RL for d:
//   d = d0 * 10^((P_tx + G_tx + G_rx - RL - PL0) / (10 n))
/// Estimate the maximum communication distance for a transmit power. Used for setup logging.
pub fn calculate_effective_distance(tx_power_dbm: f64, params: &PathLossParameters) -> f64 {
    let budget = tx_power_dbm + params.tx_gain_db + params.rx_gain_db - receiving_limit(params) - params.path_loss_at_reference_distance;
    if budget <= 0.0 {
        return params.reference_distance;
    }
    params.reference_distance * 10.0_f64.powf(budget / (10.0 * params.path_loss_exponent))
}

/// Convert power from dBm to milliwatts.
///
/// ```text
/// 0 dBm   → 1 mW
/// 20 dBm  → 100 mW
/// ```
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}
