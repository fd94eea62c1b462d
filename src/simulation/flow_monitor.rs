//! Per-flow packet bookkeeping.
//!
//! Flows are created lazily on their first packet and kept for the whole run.
//! Each packet gets a [`PacketRecord`] on send; the record is completed on
//! arrival, or marked lost with a [`LossReason`] when delivery fails or the
//! delivery window elapses.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use super::types::{FlowId, FlowKey, PacketRef, SimTime};

/// Default delivery window, matching a generous maximum per-hop delay.
pub const DEFAULT_DELIVERY_WINDOW: Duration = Duration::from_secs(10);

/// Why a packet was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossReason {
    /// The sender's energy budget was exhausted.
    SenderDepleted,
    /// The receiver's energy budget was exhausted before or during reception.
    ReceiverDepleted,
    /// The station never associated with the access point.
    NotAssociated,
    /// Received power below the receiving limit.
    BelowReceivingLimit,
    /// Still pending when the delivery window elapsed.
    DeliveryWindowExpired,
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LossReason::SenderDepleted => "sender depleted",
            LossReason::ReceiverDepleted => "receiver depleted",
            LossReason::NotAssociated => "not associated",
            LossReason::BelowReceivingLimit => "below receiving limit",
            LossReason::DeliveryWindowExpired => "delivery window expired",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// In flight.
    Pending,
    Delivered { arrival: SimTime },
    Lost { reason: LossReason, at: SimTime },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacketRecord {
    pub send_time: SimTime,
    pub size_bytes: u32,
    pub outcome: PacketOutcome,
}

impl PacketRecord {
    /// Arrival time, present only for delivered packets.
    #[cfg(test)]
    pub fn arrival_time(&self) -> Option<SimTime> {
        match self.outcome {
            PacketOutcome::Delivered { arrival } => Some(arrival),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_lost(&self) -> bool {
        matches!(self.outcome, PacketOutcome::Lost { .. })
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == PacketOutcome::Pending
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub id: FlowId,
    pub key: FlowKey,
    pub records: Vec<PacketRecord>,
}

#[derive(Debug, Clone)]
pub struct FlowMonitor {
    flows: Vec<Flow>,
    index: HashMap<FlowKey, FlowId>,
    delivery_window: Duration,
}

impl FlowMonitor {
    pub fn new(delivery_window: Duration) -> Self {
        FlowMonitor {
            flows: Vec::new(),
            index: HashMap::new(),
            delivery_window,
        }
    }

    pub fn delivery_window(&self) -> Duration {
        self.delivery_window
    }

    /// All flows in creation order.
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    #[cfg(test)]
    pub fn flow(&self, key: &FlowKey) -> Option<&Flow> {
        self.index.get(key).and_then(|id| self.flows.get(Self::slot(*id)?))
    }

    pub fn flow_by_id(&self, id: FlowId) -> Option<&Flow> {
        self.flows.get(Self::slot(id)?)
    }

    pub fn record(&self, packet: PacketRef) -> Option<&PacketRecord> {
        self.flow_by_id(packet.flow)?.records.get(packet.index)
    }

    /// Look up or create the flow for `key` and open a pending record sent at `now`.
    pub fn record_send(&mut self, key: FlowKey, now: SimTime, size_bytes: u32) -> PacketRef {
        let next_id = self.flows.len() as FlowId + 1;
        let id = *self.index.entry(key).or_insert(next_id);
        if id == next_id {
            self.flows.push(Flow {
                id,
                key,
                records: Vec::new(),
            });
        }
        let flow = &mut self.flows[id as usize - 1];
        flow.records.push(PacketRecord {
            send_time: now,
            size_bytes,
            outcome: PacketOutcome::Pending,
        });
        PacketRef {
            flow: id,
            index: flow.records.len() - 1,
        }
    }

    /// Complete a pending record. Returns `false` if the record was already settled.
    pub fn record_arrival(&mut self, packet: PacketRef, now: SimTime) -> bool {
        self.settle(packet, PacketOutcome::Delivered { arrival: now })
    }

    /// Mark a pending record lost. Returns `false` if the record was already settled.
    pub fn record_loss(&mut self, packet: PacketRef, now: SimTime, reason: LossReason) -> bool {
        self.settle(packet, PacketOutcome::Lost { reason, at: now })
    }

    /// Declare the record lost if it is still pending once its delivery window has elapsed.
    pub fn expire(&mut self, packet: PacketRef, now: SimTime) -> bool {
        match self.record(packet) {
            Some(record) if record.is_pending() && now >= record.send_time + self.delivery_window => {
                self.record_loss(packet, now, LossReason::DeliveryWindowExpired)
            }
            _ => false,
        }
    }

    /// Number of records still in flight across all flows.
    pub fn pending(&self) -> usize {
        self.flows.iter().flat_map(|f| f.records.iter()).filter(|r| r.is_pending()).count()
    }

    fn settle(&mut self, packet: PacketRef, outcome: PacketOutcome) -> bool {
        let Some(record) = Self::slot(packet.flow)
            .and_then(|slot| self.flows.get_mut(slot))
            .and_then(|flow| flow.records.get_mut(packet.index))
        else {
            return false;
        };
        if !record.is_pending() {
            return false;
        }
        record.outcome = outcome;
        true
    }

    // Flow ids start at 1.
    fn slot(id: FlowId) -> Option<usize> {
        (id as usize).checked_sub(1)
    }
}

impl Default for FlowMonitor {
    fn default() -> Self {
        FlowMonitor::new(DEFAULT_DELIVERY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::Protocol;

    fn key(source: u32) -> FlowKey {
        FlowKey {
            source,
            destination: 0,
            protocol: Protocol::Udp,
            port: 9,
        }
    }

    fn at(secs: f64) -> SimTime {
        SimTime::from_secs_f64(secs)
    }

    #[test]
    fn flows_are_created_lazily_in_order() {
        let mut monitor = FlowMonitor::default();
        assert!(monitor.flows().is_empty());

        let a = monitor.record_send(key(1), at(1.0), 100);
        let b = monitor.record_send(key(2), at(1.0), 100);
        let a2 = monitor.record_send(key(1), at(6.0), 100);

        assert_eq!(a, PacketRef { flow: 1, index: 0 });
        assert_eq!(b, PacketRef { flow: 2, index: 0 });
        assert_eq!(a2, PacketRef { flow: 1, index: 1 });
        assert_eq!(monitor.flows().len(), 2);
        assert_eq!(monitor.flow(&key(1)).map(|f| f.records.len()), Some(2));
    }

    #[test]
    fn arrival_completes_a_pending_record_once() {
        let mut monitor = FlowMonitor::default();
        let packet = monitor.record_send(key(1), at(1.0), 100);
        assert_eq!(monitor.pending(), 1);

        assert!(monitor.record_arrival(packet, at(1.001)));
        assert_eq!(monitor.record(packet).and_then(|r| r.arrival_time()), Some(at(1.001)));
        assert!(!monitor.record_arrival(packet, at(2.0)));
        assert!(!monitor.record_loss(packet, at(2.0), LossReason::BelowReceivingLimit));
        assert_eq!(monitor.pending(), 0);
    }

    #[test]
    fn loss_has_no_arrival_time() {
        let mut monitor = FlowMonitor::default();
        let packet = monitor.record_send(key(1), at(1.0), 100);
        assert!(monitor.record_loss(packet, at(1.0), LossReason::NotAssociated));
        let record = monitor.record(packet).unwrap();
        assert!(record.is_lost());
        assert_eq!(record.arrival_time(), None);
    }

    #[test]
    fn expiry_respects_the_delivery_window() {
        let mut monitor = FlowMonitor::new(Duration::from_secs(2));
        let packet = monitor.record_send(key(1), at(1.0), 100);

        assert!(!monitor.expire(packet, at(2.5)));
        assert!(monitor.expire(packet, at(3.0)));
        assert_eq!(
            monitor.record(packet).map(|r| r.outcome),
            Some(PacketOutcome::Lost {
                reason: LossReason::DeliveryWindowExpired,
                at: at(3.0)
            })
        );
        // A late arrival cannot resurrect an expired packet.
        assert!(!monitor.record_arrival(packet, at(3.5)));
    }

    #[test]
    fn unknown_references_are_ignored() {
        let mut monitor = FlowMonitor::default();
        let bogus = PacketRef { flow: 7, index: 3 };
        assert!(monitor.record(bogus).is_none());
        assert!(!monitor.record_arrival(bogus, at(1.0)));
        assert!(!monitor.expire(bogus, at(100.0)));
    }
}
