//! Network setup and the event loop model.
//!
//! `Simulation` builds the devices from a [`SimulationConfig`], decides
//! association, schedules beacons, client traffic and the stop event, then
//! drives the [`Scheduler`] with a [`Network`] as the event handler.
//!
//! Delivery of one data packet:
//! 1. `PacketSend` opens a flow record and puts the sender in Transmitting
//! 2. `ReceptionStart` reaches the receiver after the propagation delay
//! 3. `ReceptionComplete` fires one airtime later and, if the receiver still
//!    had energy, schedules `PacketArrival`
//! 4. `PacketArrival` completes the record; the access point echoes requests
//!
//! Any step that cannot proceed marks the record lost with a [`LossReason`].

use log::{debug, info, warn};
use std::time::Duration;

use super::device::Device;
use super::error::SimulationError;
use super::event_queue::{EventHandler, RunOutcome, Scheduler};
use super::flow_monitor::{Flow, FlowMonitor, LossReason};
use super::geometry::{grid_positions, random_positions};
use super::signal_calculations::{
    PathLossParameters, PhyParameters, calculate_air_time, calculate_effective_distance, dbm_to_mw, frame_air_time, is_receivable,
    link_is_receivable, link_rx_power, propagation_delay, receiving_limit,
};
use super::statistics::{self, SimulationReport};
use super::traffic::{TrafficPattern, start_flow};
use super::types::{
    ACCESS_POINT_ID, DeviceId, Event, FlowKey, OutgoingPacket, PacketRef, Point, Protocol, RadioChange, Role, SimTime, display_address,
};
use crate::common::config::{ApplicationConfig, BeaconConfig, SimulationConfig, TopologyConfig};

/// First ephemeral port; station `i` runs its echo client on `CLIENT_PORT_BASE + i`.
pub const CLIENT_PORT_BASE: u16 = 49152;

/// Echo client port of a station.
pub fn client_port(station: DeviceId) -> u16 {
    u16::try_from(station)
        .ok()
        .and_then(|offset| CLIENT_PORT_BASE.checked_add(offset))
        .unwrap_or(u16::MAX)
}

/// Compute device positions for the configured topology. Device 0 gets the first position.
pub fn place_devices(config: &SimulationConfig) -> Vec<Point> {
    let count = config.n_devices as usize;
    match &config.topology {
        TopologyConfig::Grid(grid) => grid_positions(count, grid.origin, grid.delta_x, grid.delta_y, grid.grid_width),
        TopologyConfig::Random(area) => random_positions(count, area.seed, area.width, area.height),
        TopologyConfig::Explicit(layout) => layout.devices.iter().map(|d| d.position).collect(),
    }
}

/// Mutable model state touched by event handlers.
#[derive(Debug)]
pub struct Network {
    devices: Vec<Device>,
    monitor: FlowMonitor,
    path_loss: PathLossParameters,
    phy: PhyParameters,
    beacon: BeaconConfig,
    application: ApplicationConfig,
}

impl Network {
    #[cfg(test)]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    #[cfg(test)]
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id as usize)
    }

    pub fn flows(&self) -> &[Flow] {
        self.monitor.flows()
    }

    #[cfg(test)]
    pub fn monitor(&self) -> &FlowMonitor {
        &self.monitor
    }

    fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device, SimulationError> {
        self.devices.get_mut(id as usize).ok_or(SimulationError::UnknownDevice(id))
    }

    fn lose(&mut self, packet: PacketRef, now: SimTime, reason: LossReason) {
        if self.monitor.record_loss(packet, now, reason) {
            debug!("Packet {:?} lost at {}: {}", packet, now, reason);
        }
    }

    /// Decide association for every station: the link must decode in both directions.
    fn associate(&mut self) {
        let Some(ap) = self.devices.first() else {
            return;
        };
        let (ap_position, ap_power) = (ap.position, ap.tx_power_dbm);
        for station in self.devices.iter_mut().filter(|d| !d.is_access_point()) {
            let uplink = link_is_receivable(&station.position, &ap_position, station.tx_power_dbm, &self.path_loss);
            let downlink = link_is_receivable(&ap_position, &station.position, ap_power, &self.path_loss);
            station.associated = uplink && downlink;
            if station.associated {
                info!(
                    "Station {} ({}) associated, uplink {:.1} dBm",
                    station.id,
                    display_address(station.id),
                    link_rx_power(&station.position, &ap_position, station.tx_power_dbm, &self.path_loss)
                );
            } else {
                warn!(
                    "Station {} at ({:.1}, {:.1}) is out of range of the access point and stays unassociated",
                    station.id, station.position.x, station.position.y
                );
            }
        }
    }

    fn handle_packet_send(&mut self, source: DeviceId, packet: OutgoingPacket, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
        let now = scheduler.now();
        let key = FlowKey {
            source,
            destination: packet.destination,
            protocol: packet.protocol,
            port: packet.port,
        };
        let record = self.monitor.record_send(key, now, packet.size_bytes);
        scheduler.schedule_in(Event::DeliveryTimeout { packet: record }, self.monitor.delivery_window())?;

        let (rx_position, rx_associated) = {
            let receiver = self
                .devices
                .get(packet.destination as usize)
                .ok_or(SimulationError::UnknownDevice(packet.destination))?;
            (receiver.position, receiver.associated)
        };

        let sender = self.device_mut(source)?;
        sender.settle(now);
        if sender.is_depleted() {
            self.lose(record, now, LossReason::SenderDepleted);
            return Ok(());
        }
        if !sender.associated || !rx_associated {
            self.lose(record, now, LossReason::NotAssociated);
            return Ok(());
        }
        if !sender.try_begin_transmission(now) {
            self.lose(record, now, LossReason::SenderDepleted);
            return Ok(());
        }
        let (tx_position, tx_power) = (sender.position, sender.tx_power_dbm);

        let airtime = calculate_air_time(&self.phy, packet.size_bytes);
        scheduler.schedule_in(
            Event::RadioStateChange {
                device: source,
                change: RadioChange::TransmissionComplete { packet: Some(record) },
            },
            airtime,
        )?;

        let rx_power = link_rx_power(&tx_position, &rx_position, tx_power, &self.path_loss);
        if !is_receivable(rx_power, receiving_limit(&self.path_loss)) {
            self.lose(record, now, LossReason::BelowReceivingLimit);
            return Ok(());
        }

        debug!(
            "{} -> {} port {}: {} bytes, rx {:.1} dBm, airtime {:?}",
            display_address(source),
            display_address(packet.destination),
            packet.port,
            packet.size_bytes,
            rx_power,
            airtime
        );
        scheduler.schedule_in(
            Event::RadioStateChange {
                device: packet.destination,
                change: RadioChange::ReceptionStart {
                    packet: Some(record),
                    airtime,
                },
            },
            propagation_delay(&tx_position, &rx_position),
        )
    }

    fn handle_radio_change(&mut self, id: DeviceId, change: RadioChange, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
        let now = scheduler.now();
        match change {
            RadioChange::TransmissionComplete { packet } => {
                // The receiver's ReceptionComplete never precedes this event, so a
                // frame cut short here is settled before it can be decoded.
                let completed = self.device_mut(id)?.end_transmission(now);
                if let (Some(packet), false) = (packet, completed) {
                    self.lose(packet, now, LossReason::SenderDepleted);
                }
            }
            RadioChange::ReceptionStart { packet, airtime } => {
                if self.device_mut(id)?.try_begin_reception(now) {
                    scheduler.schedule_in(
                        Event::RadioStateChange {
                            device: id,
                            change: RadioChange::ReceptionComplete { packet },
                        },
                        airtime,
                    )?;
                } else if let Some(packet) = packet {
                    self.lose(packet, now, LossReason::ReceiverDepleted);
                }
            }
            RadioChange::ReceptionComplete { packet } => {
                let decoded = self.device_mut(id)?.end_reception(now);
                match (packet, decoded) {
                    (Some(packet), true) => scheduler.schedule_in(Event::PacketArrival { device: id, packet }, Duration::ZERO)?,
                    (Some(packet), false) => self.lose(packet, now, LossReason::ReceiverDepleted),
                    (None, _) => {}
                }
            }
        }
        Ok(())
    }

    fn handle_packet_arrival(&mut self, id: DeviceId, packet: PacketRef, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
        let now = scheduler.now();
        if !self.monitor.record_arrival(packet, now) {
            debug!("Late arrival of {:?} at device {} ignored", packet, id);
            return Ok(());
        }

        let Some((key, size_bytes)) = self
            .monitor
            .flow_by_id(packet.flow)
            .zip(self.monitor.record(packet))
            .map(|(flow, record)| (flow.key, record.size_bytes))
        else {
            return Ok(());
        };

        let is_echo_request = id == ACCESS_POINT_ID && key.port == self.application.echo_port && key.protocol == Protocol::Udp;
        if is_echo_request && self.application.echo_replies {
            let reply = OutgoingPacket {
                destination: key.source,
                protocol: Protocol::Udp,
                port: client_port(key.source),
                size_bytes,
            };
            scheduler.schedule_in(Event::PacketSend { device: id, packet: reply }, Duration::ZERO)?;
        }
        Ok(())
    }

    fn handle_beacon(&mut self, id: DeviceId, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
        let now = scheduler.now();
        let ap = self.device_mut(id)?;
        if !ap.try_begin_transmission(now) {
            debug!("Access point depleted, beaconing stops at {}", now);
            return Ok(());
        }
        let (ap_position, ap_power) = (ap.position, ap.tx_power_dbm);

        let airtime = frame_air_time(&self.phy, u64::from(self.beacon.size_bytes));
        scheduler.schedule_in(
            Event::RadioStateChange {
                device: id,
                change: RadioChange::TransmissionComplete { packet: None },
            },
            airtime,
        )?;

        for station in self.devices.iter().filter(|d| !d.is_access_point() && d.associated && !d.is_depleted()) {
            if !link_is_receivable(&ap_position, &station.position, ap_power, &self.path_loss) {
                continue;
            }
            scheduler.schedule_in(
                Event::RadioStateChange {
                    device: station.id,
                    change: RadioChange::ReceptionStart { packet: None, airtime },
                },
                propagation_delay(&ap_position, &station.position),
            )?;
        }

        scheduler.schedule_in(Event::Beacon { device: id }, Duration::from_secs_f64(self.beacon.interval_s))
    }
}

impl EventHandler for Network {
    fn handle(&mut self, event: Event, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
        match event {
            Event::PacketSend { device, packet } => self.handle_packet_send(device, packet, scheduler),
            Event::PacketArrival { device, packet } => self.handle_packet_arrival(device, packet, scheduler),
            Event::RadioStateChange { device, change } => self.handle_radio_change(device, change, scheduler),
            Event::Beacon { device } => self.handle_beacon(device, scheduler),
            Event::DeliveryTimeout { packet } => {
                let now = scheduler.now();
                if self.monitor.expire(packet, now) {
                    debug!("Packet {:?} expired at {}", packet, now);
                }
                Ok(())
            }
            Event::SimulationStop => {
                info!("Simulation stop reached at {}", scheduler.now());
                Ok(())
            }
        }
    }
}

/// A configured run: the scheduler, the network and the stop time.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    scheduler: Scheduler,
    network: Network,
    stop_time: SimTime,
}

impl Simulation {
    /// Validate the configuration, place and associate devices, and schedule the initial events.
    ///
    /// # Parameters
    ///
    /// * `config` - Parameters of the run
    ///
    /// # Returns
    ///
    /// A simulation ready to run, or `SimulationError::Configuration` if the
    /// configuration is not physical.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        if config.enable_pcap {
            warn!("Packet capture was requested but is not supported, ignoring");
        }

        let devices: Vec<Device> = place_devices(&config)
            .into_iter()
            .enumerate()
            .map(|(index, position)| {
                let role = if index == ACCESS_POINT_ID as usize { Role::AccessPoint } else { Role::Station };
                Device::new(
                    index as DeviceId,
                    role,
                    position,
                    config.device_tx_power(index),
                    config.energy.clone(),
                    config.device_initial_energy(index),
                )
            })
            .collect();

        info!(
            "Setting up {} devices (1 AP, {} stations) for {} s, effective range at {} dBm ({:.1} mW): {:.1} m",
            devices.len(),
            devices.len().saturating_sub(1),
            config.simulation_time_s,
            config.tx_power_dbm,
            dbm_to_mw(config.tx_power_dbm),
            calculate_effective_distance(config.tx_power_dbm, &config.path_loss)
        );

        let mut network = Network {
            devices,
            monitor: FlowMonitor::new(config.delivery_window()),
            path_loss: config.path_loss.clone(),
            phy: config.phy.clone(),
            beacon: config.beacon.clone(),
            application: config.application.clone(),
        };
        network.associate();

        let stop_time = SimTime::from_duration(config.simulation_time());
        let mut scheduler = Scheduler::new();
        scheduler.stop(stop_time)?;

        if config.beacon.enabled {
            scheduler.schedule(Event::Beacon { device: ACCESS_POINT_ID }, SimTime::ZERO)?;
        }

        let pattern = TrafficPattern {
            interval: Duration::from_secs_f64(config.application.interval_s),
            packet_size: config.application.packet_size,
            packet_count: config.application.packet_count,
            start: SimTime::from_secs_f64(config.application.start_s),
            stop: SimTime::from_secs_f64(config.client_stop_s()),
        };
        for station in network.devices.iter().filter(|d| !d.is_access_point()) {
            start_flow(
                &mut scheduler,
                station.id,
                ACCESS_POINT_ID,
                Protocol::Udp,
                config.application.echo_port,
                &pattern,
            )?;
        }

        Ok(Simulation {
            config,
            scheduler,
            network,
            stop_time,
        })
    }

    #[cfg(test)]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Dispatch every event up to the stop time, then charge each device up to the stop time.
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        let outcome = self.scheduler.run(self.stop_time, &mut self.network)?;
        for device in &mut self.network.devices {
            device.settle(self.stop_time);
        }
        info!(
            "Run ended ({:?}) after {} events ({} left queued), {} packets still in flight",
            outcome,
            self.scheduler.dispatched(),
            self.scheduler.pending(),
            self.network.monitor.pending()
        );
        if outcome == RunOutcome::QueueExhausted {
            debug!("Event queue drained before the stop time");
        }
        Ok(self.report())
    }

    /// Reduce the current state into a report. Pure, so it can be called repeatedly.
    pub fn report(&self) -> SimulationReport {
        statistics::aggregate(self.network.flows(), &self.network.devices, self.config.simulation_time())
    }
}
