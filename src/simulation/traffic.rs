//! Periodic traffic generation.
//!
//! A flow is started by scheduling all of its `PacketSend` events up front:
//! packet `k` is sent at `start + k × interval`, for `k < packet_count`, and
//! only while the send time stays inside `[start, stop]`. Packets are never
//! split, so a clipped flow simply sends fewer packets.

use std::time::Duration;

use super::error::SimulationError;
use super::event_queue::Scheduler;
use super::types::{DeviceId, Event, OutgoingPacket, Protocol, SimTime};

/// Timing and size of one periodic flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficPattern {
    pub interval: Duration,
    pub packet_size: u32,
    pub packet_count: u32,
    pub start: SimTime,
    pub stop: SimTime,
}

impl TrafficPattern {
    /// Send times of every packet this pattern generates.
    pub fn send_times(&self) -> Vec<SimTime> {
        if self.stop < self.start {
            return Vec::new();
        }
        let mut times = Vec::new();
        for k in 0..self.packet_count {
            let Some(at) = self.interval.checked_mul(k).and_then(|offset| self.start.checked_add(offset)) else {
                break;
            };
            if at > self.stop {
                break;
            }
            times.push(at);
        }
        times
    }
}

/// Schedule the `PacketSend` events of a periodic flow from `source` to `destination`.
///
/// # Parameters
///
/// * `scheduler` - Queue receiving the send events
/// * `source`, `destination` - Endpoints of the flow
/// * `protocol`, `port` - Destination transport endpoint
/// * `pattern` - Interval, packet size, count and `[start, stop]` window
///
/// # Returns
///
/// Number of packets scheduled.
///
/// # Errors
///
/// `SimulationError::InvalidTime` if the window starts before the current time.
pub fn start_flow(
    scheduler: &mut Scheduler,
    source: DeviceId,
    destination: DeviceId,
    protocol: Protocol,
    port: u16,
    pattern: &TrafficPattern,
) -> Result<usize, SimulationError> {
    let packet = OutgoingPacket {
        destination,
        protocol,
        port,
        size_bytes: pattern.packet_size,
    };
    let times = pattern.send_times();
    for &at in &times {
        scheduler.schedule(Event::PacketSend { device: source, packet }, at)?;
    }
    log::debug!(
        "Flow {} -> {} port {}: {} packets of {} bytes scheduled from {} every {:?}",
        source,
        destination,
        port,
        times.len(),
        pattern.packet_size,
        pattern.start,
        pattern.interval
    );
    Ok(times.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::event_queue::EventHandler;

    fn secs(s: f64) -> SimTime {
        SimTime::from_secs_f64(s)
    }

    fn pattern(count: u32, start: f64, stop: f64) -> TrafficPattern {
        TrafficPattern {
            interval: Duration::from_secs(5),
            packet_size: 100,
            packet_count: count,
            start: secs(start),
            stop: secs(stop),
        }
    }

    #[derive(Default)]
    struct SendCollector {
        sends: Vec<SimTime>,
    }

    impl EventHandler for SendCollector {
        fn handle(&mut self, event: Event, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
            if let Event::PacketSend { .. } = event {
                self.sends.push(scheduler.now());
            }
            Ok(())
        }
    }

    #[test]
    fn count_limits_the_flow() {
        // 10 packets every 5 s from t = 1 s with the application stopping at 59 s.
        let mut scheduler = Scheduler::new();
        let scheduled = start_flow(&mut scheduler, 1, 0, Protocol::Udp, 9, &pattern(10, 1.0, 59.0)).unwrap();
        assert_eq!(scheduled, 10);

        let mut collector = SendCollector::default();
        scheduler.run(secs(60.0), &mut collector).unwrap();
        let expected: Vec<SimTime> = [1.0, 6.0, 11.0, 16.0, 21.0, 26.0, 31.0, 36.0, 41.0, 46.0].into_iter().map(secs).collect();
        assert_eq!(collector.sends, expected);
    }

    #[test]
    fn window_clips_the_flow() {
        let times = pattern(100, 1.0, 59.0).send_times();
        assert_eq!(times.len(), 12);
        assert_eq!(times.last(), Some(&secs(56.0)));
    }

    #[test]
    fn send_on_the_stop_boundary_is_kept() {
        let times = pattern(100, 1.0, 11.0).send_times();
        assert_eq!(times, vec![secs(1.0), secs(6.0), secs(11.0)]);
    }

    #[test]
    fn empty_window_sends_nothing() {
        assert!(pattern(10, 30.0, 20.0).send_times().is_empty());
        assert!(pattern(0, 1.0, 20.0).send_times().is_empty());
    }

    #[test]
    fn schedule_ends_where_time_runs_out() {
        let pattern = TrafficPattern {
            interval: Duration::MAX / 2,
            packet_size: 100,
            packet_count: u32::MAX,
            start: SimTime::ZERO,
            stop: SimTime::from_duration(Duration::MAX),
        };
        assert_eq!(pattern.send_times().len(), 3);
    }

    #[test]
    fn starting_in_the_past_is_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Event::SimulationStop, secs(10.0)).unwrap();
        let mut collector = SendCollector::default();
        scheduler.run(secs(10.0), &mut collector).unwrap();

        let err = start_flow(&mut scheduler, 1, 0, Protocol::Udp, 9, &pattern(3, 1.0, 20.0)).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidTime { .. }));
    }
}
