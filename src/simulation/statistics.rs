//! Reduction of completed flow records and device energy into summary metrics.
//!
//! Everything here is a pure fold over immutable data: nothing is mutated, so
//! the aggregation can be run any number of times on the same records.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::device::Device;
use super::energy::StateEnergy;
use super::flow_monitor::{Flow, LossReason, PacketOutcome};
use super::types::{DeviceId, FlowId, Point, Protocol, Role, SimTime};

/// Metrics of one flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowStats {
    pub flow_id: FlowId,
    pub source: DeviceId,
    pub destination: DeviceId,
    pub protocol: Protocol,
    pub port: u16,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub lost_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// `rx / tx`, 0 when nothing was sent.
    pub delivery_ratio: f64,
    /// Sum of `arrival - send` over received packets (seconds).
    pub delay_sum_s: f64,
    /// Mean delay over received packets (seconds), 0 when nothing was received.
    pub avg_delay_s: f64,
    /// `8 × rx_bytes / (last_rx - first_tx) / 1000`, 0 when the span is not positive.
    pub throughput_kbps: f64,
    pub first_tx_s: Option<f64>,
    pub last_rx_s: Option<f64>,
    pub lost_by_reason: BTreeMap<LossReason, u64>,
}

/// Energy accounting of one device at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEnergyReport {
    pub device: DeviceId,
    pub role: Role,
    pub position: Point,
    pub associated: bool,
    /// Serialized as `null` for unlimited budgets.
    pub initial_energy_j: f64,
    pub consumed_j: f64,
    pub remaining_j: f64,
    pub by_state: StateEnergy,
    pub depleted_at_s: Option<f64>,
    pub frames_transmitted: u64,
    pub frames_received: u64,
}

/// Totals across every flow and device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSummary {
    pub device_count: usize,
    pub flow_count: usize,
    pub total_tx_packets: u64,
    pub total_rx_packets: u64,
    pub total_lost_packets: u64,
    pub total_rx_bytes: u64,
    pub global_delivery_ratio: f64,
    /// Sum of the per-flow average delays divided by the number of flows (seconds).
    /// Flows that received nothing contribute zero but still count in the divisor.
    pub global_avg_delay_s: f64,
    /// Total delay over total received packets (seconds).
    pub packet_weighted_delay_s: f64,
    /// `8 × total_rx_bytes / simulation_time / 1000`.
    pub global_throughput_kbps: f64,
    pub total_energy_consumed_j: f64,
    pub avg_energy_per_device_j: f64,
    pub depleted_devices: usize,
}

/// Final output of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub simulation_time_s: f64,
    pub flows: Vec<FlowStats>,
    pub devices: Vec<DeviceEnergyReport>,
    pub summary: GlobalSummary,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 { numerator / denominator } else { 0.0 }
}

/// Compute the metrics of a single flow from its packet records.
pub fn flow_stats(flow: &Flow) -> FlowStats {
    let mut rx_packets = 0u64;
    let mut lost_packets = 0u64;
    let mut tx_bytes = 0u64;
    let mut rx_bytes = 0u64;
    let mut delay_sum_s = 0.0;
    let mut first_tx: Option<SimTime> = None;
    let mut last_rx: Option<SimTime> = None;
    let mut lost_by_reason = BTreeMap::new();

    for record in &flow.records {
        tx_bytes += record.size_bytes as u64;
        first_tx = Some(first_tx.map_or(record.send_time, |t| t.min(record.send_time)));
        match record.outcome {
            PacketOutcome::Delivered { arrival } => {
                rx_packets += 1;
                rx_bytes += record.size_bytes as u64;
                delay_sum_s += arrival.saturating_duration_since(record.send_time).as_secs_f64();
                last_rx = Some(last_rx.map_or(arrival, |t| t.max(arrival)));
            }
            PacketOutcome::Lost { reason, .. } => {
                lost_packets += 1;
                *lost_by_reason.entry(reason).or_insert(0) += 1;
            }
            PacketOutcome::Pending => {}
        }
    }

    let tx_packets = flow.records.len() as u64;
    let span_s = match (first_tx, last_rx) {
        (Some(first), Some(last)) => last.saturating_duration_since(first).as_secs_f64(),
        _ => 0.0,
    };

    FlowStats {
        flow_id: flow.id,
        source: flow.key.source,
        destination: flow.key.destination,
        protocol: flow.key.protocol,
        port: flow.key.port,
        tx_packets,
        rx_packets,
        lost_packets,
        tx_bytes,
        rx_bytes,
        delivery_ratio: ratio(rx_packets as f64, tx_packets as f64),
        delay_sum_s,
        avg_delay_s: ratio(delay_sum_s, rx_packets as f64),
        throughput_kbps: ratio(8.0 * rx_bytes as f64, span_s) / 1000.0,
        first_tx_s: first_tx.map(|t| t.as_secs_f64()),
        last_rx_s: last_rx.map(|t| t.as_secs_f64()),
        lost_by_reason,
    }
}

/// Snapshot a device's energy accounting. The device should be settled to the end of the run first.
pub fn device_energy(device: &Device) -> DeviceEnergyReport {
    let energy = device.energy();
    DeviceEnergyReport {
        device: device.id,
        role: device.role,
        position: device.position,
        associated: device.associated,
        initial_energy_j: energy.initial_energy(),
        consumed_j: energy.total_consumed(),
        remaining_j: energy.remaining_energy(),
        by_state: energy.ledger(),
        depleted_at_s: device.depleted_at().map(|t| t.as_secs_f64()),
        frames_transmitted: device.frames_transmitted,
        frames_received: device.frames_received,
    }
}

/// Fold per-flow and per-device reports into global totals.
///
/// # Parameters
///
/// * `flows` - Per-flow metrics
/// * `devices` - Per-device energy reports
/// * `simulation_time` - Length of the run, the divisor of the global throughput
pub fn summarize(flows: &[FlowStats], devices: &[DeviceEnergyReport], simulation_time: Duration) -> GlobalSummary {
    let total_tx_packets: u64 = flows.iter().map(|f| f.tx_packets).sum();
    let total_rx_packets: u64 = flows.iter().map(|f| f.rx_packets).sum();
    let total_lost_packets: u64 = flows.iter().map(|f| f.lost_packets).sum();
    let total_rx_bytes: u64 = flows.iter().map(|f| f.rx_bytes).sum();
    let total_delay_s: f64 = flows.iter().map(|f| f.delay_sum_s).sum();
    let flow_delay_sum_s: f64 = flows.iter().filter(|f| f.rx_packets > 0).map(|f| f.avg_delay_s).sum();
    let total_energy_consumed_j: f64 = devices.iter().map(|d| d.consumed_j).sum();

    GlobalSummary {
        device_count: devices.len(),
        flow_count: flows.len(),
        total_tx_packets,
        total_rx_packets,
        total_lost_packets,
        total_rx_bytes,
        global_delivery_ratio: ratio(total_rx_packets as f64, total_tx_packets as f64),
        global_avg_delay_s: ratio(flow_delay_sum_s, flows.len() as f64),
        packet_weighted_delay_s: ratio(total_delay_s, total_rx_packets as f64),
        global_throughput_kbps: ratio(8.0 * total_rx_bytes as f64, simulation_time.as_secs_f64()) / 1000.0,
        total_energy_consumed_j,
        avg_energy_per_device_j: ratio(total_energy_consumed_j, devices.len() as f64),
        depleted_devices: devices.iter().filter(|d| d.depleted_at_s.is_some()).count(),
    }
}

/// Build the full report from flow records and devices.
pub fn aggregate(flows: &[Flow], devices: &[Device], simulation_time: Duration) -> SimulationReport {
    let flows: Vec<FlowStats> = flows.iter().map(flow_stats).collect();
    let devices: Vec<DeviceEnergyReport> = devices.iter().map(device_energy).collect();
    let summary = summarize(&flows, &devices, simulation_time);
    SimulationReport {
        simulation_time_s: simulation_time.as_secs_f64(),
        flows,
        devices,
        summary,
    }
}
