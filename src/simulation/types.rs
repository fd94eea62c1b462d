//! Type definitions shared across the simulation.
//!
//! Contains:
//! - Simulated time (`SimTime`) with nanosecond resolution
//! - Device identity, role and position
//! - Flow keys and packet references
//! - The `Event` tagged union dispatched by the scheduler

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Point in simulated time.
///
/// Stored as a `Duration` since the start of the run so that ordering is total
/// and reports are bit-reproducible across runs (no floating point keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(Duration);

impl SimTime {
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime(Duration::from_secs_f64(secs.max(0.0)))
    }

    pub fn from_duration(since_start: Duration) -> Self {
        SimTime(since_start)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// `self + delta`, or `None` past the end of representable time.
    pub fn checked_add(&self, delta: Duration) -> Option<SimTime> {
        self.0.checked_add(delta).map(SimTime)
    }

    /// Time elapsed since `earlier`, zero if `earlier` is later than `self`.
    pub fn saturating_duration_since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.0.as_secs_f64())
    }
}

/// Device identifier. The access point is always device 0.
pub type DeviceId = u32;

/// The access point's identifier.
pub const ACCESS_POINT_ID: DeviceId = 0;

/// Distinguishes the access point from client stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    AccessPoint,
    Station,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::AccessPoint => f.pad("AP"),
            Role::Station => f.pad("STA"),
        }
    }
}

/// Simple 2D point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Identifies one logical packet exchange. The port is the destination port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub source: DeviceId,
    pub destination: DeviceId,
    pub protocol: Protocol,
    pub port: u16,
}

/// Sequential flow identifier, assigned in order of first packet (starting at 1).
pub type FlowId = u32;

/// Location of a packet record inside the flow monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketRef {
    pub flow: FlowId,
    pub index: usize,
}

/// Application payload handed to the radio on a `PacketSend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingPacket {
    pub destination: DeviceId,
    pub protocol: Protocol,
    pub port: u16,
    pub size_bytes: u32,
}

/// Radio-level transitions scheduled against a single device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioChange {
    /// The device finished putting a frame on the air. `packet` is `None` for beacons.
    TransmissionComplete { packet: Option<PacketRef> },
    /// The first bit of a frame reaches the device. `packet` is `None` for beacons.
    ReceptionStart { packet: Option<PacketRef>, airtime: Duration },
    /// The last bit of a frame has been received.
    ReceptionComplete { packet: Option<PacketRef> },
}

/// Events dispatched by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The application on `device` hands a packet to its radio.
    PacketSend { device: DeviceId, packet: OutgoingPacket },
    /// A packet has been fully received by `device`.
    PacketArrival { device: DeviceId, packet: PacketRef },
    /// A radio transition on `device`.
    RadioStateChange { device: DeviceId, change: RadioChange },
    /// The access point emits a beacon.
    Beacon { device: DeviceId },
    /// A packet's delivery window elapsed; still-pending records are declared lost.
    DeliveryTimeout { packet: PacketRef },
    /// End of the run; nothing is dispatched after this.
    SimulationStop,
}

/// Dotted IPv4 address used only for display (192.168.1.0/24, AP first).
pub fn display_address(device: DeviceId) -> String {
    format!("192.168.1.{}", device + 1)
}
