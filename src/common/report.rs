//! Text and JSON rendering of a finished run.

use anyhow::Context;
use std::fmt::Write;
use std::fs;
use std::path::Path;

use crate::simulation::statistics::SimulationReport;
use crate::simulation::types::display_address;

/// Render the per-flow blocks, the energy table and the global summary as plain text.
pub fn format_report(report: &SimulationReport) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_report(&mut out, report)?;
    Ok(out)
}

fn write_report(out: &mut String, report: &SimulationReport) -> std::fmt::Result {
    for flow in &report.flows {
        writeln!(
            out,
            "\nFlow {} ({} -> {}) {} port {}",
            flow.flow_id,
            display_address(flow.source),
            display_address(flow.destination),
            flow.protocol,
            flow.port
        )?;
        writeln!(out, "  Tx Packets: {}", flow.tx_packets)?;
        writeln!(out, "  Rx Packets: {}", flow.rx_packets)?;
        if flow.tx_packets > 0 {
            writeln!(out, "  Packet delivery ratio: {:.2}%", flow.delivery_ratio * 100.0)?;
            if flow.rx_packets > 0 {
                writeln!(out, "  Average delay: {:.6}s", flow.avg_delay_s)?;
            }
        }
        writeln!(out, "  Throughput: {:.4} kbps", flow.throughput_kbps)?;
        for (reason, count) in &flow.lost_by_reason {
            writeln!(out, "  Lost ({}): {}", reason, count)?;
        }
    }

    writeln!(out, "\nEnergy per device:")?;
    writeln!(out, "--------------------------------")?;
    for device in &report.devices {
        write!(
            out,
            "  {:>3} {:<3} {:<13} consumed {:.6} J (tx {:.6}, rx {:.6}, idle {:.6})",
            device.device,
            device.role,
            display_address(device.device),
            device.consumed_j,
            device.by_state.tx_j,
            device.by_state.rx_j,
            device.by_state.idle_j
        )?;
        if let Some(at) = device.depleted_at_s {
            write!(out, ", depleted at {:.3}s", at)?;
        }
        if !device.associated {
            write!(out, ", not associated")?;
        }
        writeln!(out)?;
    }

    let summary = &report.summary;
    writeln!(out, "\nGlobal simulation results:")?;
    writeln!(out, "--------------------------------")?;
    writeln!(out, "IoT devices: {}", summary.device_count)?;
    writeln!(out, "Simulation time: {}s", report.simulation_time_s)?;
    writeln!(out, "Total transmitted packets: {}", summary.total_tx_packets)?;
    writeln!(out, "Total received packets: {}", summary.total_rx_packets)?;
    writeln!(out, "Total lost packets: {}", summary.total_lost_packets)?;
    if summary.total_tx_packets > 0 {
        writeln!(out, "Global delivery ratio: {:.2}%", summary.global_delivery_ratio * 100.0)?;
    }
    if summary.total_rx_packets > 0 {
        writeln!(out, "Global average delay: {:.6}s", summary.global_avg_delay_s)?;
        writeln!(out, "Packet-weighted average delay: {:.6}s", summary.packet_weighted_delay_s)?;
    }
    writeln!(out, "Global throughput: {:.4} kbps", summary.global_throughput_kbps)?;
    writeln!(out, "Total energy consumption: {:.6} J", summary.total_energy_consumed_j)?;
    writeln!(out, "Average consumption per device: {:.6} J", summary.avg_energy_per_device_j)?;
    if summary.depleted_devices > 0 {
        writeln!(out, "Depleted devices: {}", summary.depleted_devices)?;
    }
    Ok(())
}

/// Write the report as pretty-printed JSON.
///
/// # Parameters
///
/// * `report` - Finished run
/// * `path` - Destination file, overwritten if present
pub fn write_json(report: &SimulationReport, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::{DevicePlacement, ExplicitLayout, SimulationConfig, TopologyConfig};
    use crate::simulation::Simulation;
    use crate::simulation::types::Point;

    fn small_run() -> SimulationReport {
        let config = SimulationConfig {
            n_devices: 2,
            topology: TopologyConfig::Explicit(ExplicitLayout {
                devices: [(0.0, 0.0), (2.0, 0.0)]
                    .into_iter()
                    .map(|(x, y)| DevicePlacement {
                        position: Point::new(x, y),
                        tx_power_dbm: None,
                        initial_energy_j: None,
                    })
                    .collect(),
            }),
            ..SimulationConfig::default()
        };
        Simulation::new(config).unwrap().run().unwrap()
    }

    #[test]
    fn text_report_lists_flows_and_totals() {
        let text = format_report(&small_run()).unwrap();
        assert!(text.contains("Flow 1 (192.168.1.2 -> 192.168.1.1) UDP port 9"));
        assert!(text.contains("Flow 2 (192.168.1.1 -> 192.168.1.2) UDP port 49153"));
        assert!(text.contains("  Tx Packets: 12"));
        assert!(text.contains("Packet delivery ratio: 100.00%"));
        assert!(text.contains("IoT devices: 2"));
        assert!(text.contains("Total transmitted packets: 24"));
        assert!(text.contains("Global delivery ratio: 100.00%"));
        assert!(text.contains("Global average delay: "));
        assert!(text.contains("Packet-weighted average delay: "));
    }

    #[test]
    fn empty_report_renders_without_delay_lines() {
        let report = SimulationReport {
            simulation_time_s: 1.0,
            flows: Vec::new(),
            devices: Vec::new(),
            summary: crate::simulation::statistics::summarize(&[], &[], std::time::Duration::from_secs(1)),
        };
        let text = format_report(&report).unwrap();
        assert!(text.contains("Total transmitted packets: 0"));
        assert!(!text.contains("average delay"));
    }

    #[test]
    fn json_report_round_trips_through_a_file() {
        let report = small_run();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&report, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total_tx_packets"], 24);
        assert_eq!(value["flows"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["devices"][0]["role"], "access_point");
    }

    #[test]
    fn writing_into_a_missing_directory_fails_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_json(&small_run(), &dir.path().join("missing").join("report.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to write report"));
    }
}
