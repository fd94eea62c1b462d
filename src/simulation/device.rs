//! Device record shared by the access point and the stations.
//!
//! Role-specific behavior (beaconing, associating, echoing) is decided by the
//! network loop branching on [`Role`]; the record itself only couples the
//! radio state machine to the energy model so that every state duration is
//! charged before the next state is entered.

use log::warn;

use super::energy::{EnergyModel, EnergyParameters};
use super::radio::{RadioStateMachine, StateDuration};
use super::types::{DeviceId, Point, Role, SimTime};

#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub role: Role,
    pub position: Point,
    pub tx_power_dbm: f64,
    /// Stations only: whether the AP admitted this station.
    pub associated: bool,
    /// Frames put on the air (data and beacons).
    pub frames_transmitted: u64,
    /// Frames fully received (data and beacons).
    pub frames_received: u64,
    radio: RadioStateMachine,
    energy: EnergyModel,
    depleted_at: Option<SimTime>,
}

impl Device {
    pub fn new(id: DeviceId, role: Role, position: Point, tx_power_dbm: f64, energy_params: EnergyParameters, initial_energy_j: f64) -> Self {
        let energy = EnergyModel::new(energy_params, initial_energy_j);
        let depleted_at = energy.is_depleted().then_some(SimTime::ZERO);
        Device {
            id,
            role,
            position,
            tx_power_dbm,
            associated: role == Role::AccessPoint,
            frames_transmitted: 0,
            frames_received: 0,
            radio: RadioStateMachine::new(SimTime::ZERO),
            energy,
            depleted_at,
        }
    }

    pub fn is_access_point(&self) -> bool {
        self.role == Role::AccessPoint
    }

    #[cfg(test)]
    pub fn radio_state(&self) -> super::radio::RadioState {
        self.radio.state()
    }

    pub fn energy(&self) -> &EnergyModel {
        &self.energy
    }

    pub fn is_depleted(&self) -> bool {
        self.energy.is_depleted()
    }

    /// When the budget reached zero, if it did.
    pub fn depleted_at(&self) -> Option<SimTime> {
        self.depleted_at
    }

    /// Charge the time spent in the current state up to `now`.
    pub fn settle(&mut self, now: SimTime) {
        let record = self.radio.settle(now);
        self.charge(record);
    }

    /// Enter Transmitting. Refused (device stays as it is) when the budget is exhausted.
    pub fn try_begin_transmission(&mut self, now: SimTime) -> bool {
        self.settle(now);
        if self.is_depleted() {
            return false;
        }
        let record = self.radio.begin_transmission(now);
        self.charge(record);
        self.frames_transmitted += 1;
        true
    }

    /// Leave Transmitting.
    ///
    /// # Returns
    ///
    /// `true` if the budget lasted until `now`, meaning the whole frame went out.
    pub fn end_transmission(&mut self, now: SimTime) -> bool {
        let record = self.radio.end_transmission(now);
        self.charge(record);
        self.lasted_until(now)
    }

    /// Enter Receiving. Refused when the budget is exhausted.
    pub fn try_begin_reception(&mut self, now: SimTime) -> bool {
        self.settle(now);
        if self.is_depleted() {
            return false;
        }
        let record = self.radio.begin_reception(now);
        self.charge(record);
        true
    }

    /// Leave Receiving.
    ///
    /// # Returns
    ///
    /// `true` if the device still had energy for the whole reception, meaning
    /// the frame was decoded.
    pub fn end_reception(&mut self, now: SimTime) -> bool {
        let record = self.radio.end_reception(now);
        self.charge(record);
        let decoded = self.lasted_until(now);
        if decoded {
            self.frames_received += 1;
        }
        decoded
    }

    fn lasted_until(&self, now: SimTime) -> bool {
        self.depleted_at.is_none_or(|at| at >= now)
    }

    fn charge(&mut self, record: StateDuration) {
        if let Some(offset) = self.energy.on_state_duration(record.state, record.duration) {
            let at = record.since + offset;
            self.depleted_at = Some(at);
            warn!("Device {} ({}) ran out of energy at {} while {}", self.id, self.role, at, record.state);
        }
    }
}
