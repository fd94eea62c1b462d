//! Simulated clock and event queue with deterministic ordering.
//!
//! Events are ordered by:
//! 1. Fire time (earlier first)
//! 2. Insertion sequence (FIFO for equal fire times)
//!
//! The scheduler is single-threaded: a handler runs to completion before the
//! next event is popped, so every model mutation inside one dispatch is atomic
//! relative to other events.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use super::error::SimulationError;
use super::types::{Event, SimTime};

/// Key for ordering events in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKey {
    /// When this event should be dispatched.
    pub time: SimTime,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => self.sequence.cmp(&other.sequence),
            ord => ord,
        }
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct ScheduledEvent {
    key: EventKey,
    event: Event,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap; reverse so the earliest key is popped first.
impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

/// Receives events popped by the [`Scheduler`].
///
/// The handler gets mutable access to the scheduler so it can enqueue
/// follow-up events; it must never block.
pub trait EventHandler {
    fn handle(&mut self, event: Event, scheduler: &mut Scheduler) -> Result<(), SimulationError>;
}

/// Why [`Scheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A `SimulationStop` event was dispatched.
    Stopped,
    /// The next pending event lies beyond the stop time.
    StopTimeReached,
    /// No events left.
    QueueExhausted,
}

/// Simulated clock plus time-ordered queue of pending events.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: SimTime,
    queue: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
    dispatched: u64,
    stopped: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of events dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Whether a `SimulationStop` event has been dispatched.
    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Fire time of the earliest pending event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|scheduled| scheduled.key.time)
    }

    /// Enqueue `event` to fire at `fire_time`.
    ///
    /// # Errors
    ///
    /// `SimulationError::InvalidTime` if `fire_time` is earlier than the current time.
    pub fn schedule(&mut self, event: Event, fire_time: SimTime) -> Result<(), SimulationError> {
        if fire_time < self.now {
            return Err(SimulationError::InvalidTime {
                now: self.now,
                requested: fire_time,
            });
        }
        let key = EventKey {
            time: fire_time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.queue.push(ScheduledEvent { key, event });
        Ok(())
    }

    /// Enqueue `event` to fire `delay` after the current time.
    ///
    /// # Errors
    ///
    /// `SimulationError::TimeOverflow` if the fire time is not representable.
    pub fn schedule_in(&mut self, event: Event, delay: Duration) -> Result<(), SimulationError> {
        let fire_time = self
            .now
            .checked_add(delay)
            .ok_or(SimulationError::TimeOverflow { now: self.now, delay })?;
        self.schedule(event, fire_time)
    }

    /// Schedule the end of the run at `at`.
    pub fn stop(&mut self, at: SimTime) -> Result<(), SimulationError> {
        self.schedule(Event::SimulationStop, at)
    }

    /// Pop the earliest event and advance the clock to its fire time.
    fn pop(&mut self) -> Option<Event> {
        let scheduled = self.queue.pop()?;
        self.now = scheduled.key.time;
        self.dispatched += 1;
        Some(scheduled.event)
    }

    /// Dispatch events in time order until a stop event, the stop time, or an empty queue.
    ///
    /// The `stop_time` bound is inclusive: events scheduled exactly at it are
    /// still dispatched in FIFO order. A run that must end once the clock
    /// reaches `stop_time` schedules its `SimulationStop` there before anything
    /// else, so the stop wins every tie and nothing else at that instant runs.
    ///
    /// # Parameters
    ///
    /// * `stop_time` - No event with a later fire time is dispatched
    /// * `handler` - Model receiving every dispatched event
    ///
    /// # Returns
    ///
    /// Why the loop ended, or the first error raised by the handler.
    pub fn run<H: EventHandler>(&mut self, stop_time: SimTime, handler: &mut H) -> Result<RunOutcome, SimulationError> {
        loop {
            if self.stopped {
                return Ok(RunOutcome::Stopped);
            }
            match self.peek_time() {
                None => return Ok(RunOutcome::QueueExhausted),
                Some(next) if next > stop_time => return Ok(RunOutcome::StopTimeReached),
                Some(_) => {}
            }
            let Some(event) = self.pop() else {
                return Ok(RunOutcome::QueueExhausted);
            };
            if event == Event::SimulationStop {
                self.stopped = true;
            }
            handler.handle(event, self)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::{PacketRef, RadioChange};

    /// Records every dispatched event with its time.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(SimTime, Event)>,
    }

    impl EventHandler for Recorder {
        fn handle(&mut self, event: Event, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
            self.seen.push((scheduler.now(), event));
            Ok(())
        }
    }

    fn beacon(device: u32) -> Event {
        Event::Beacon { device }
    }

    fn secs(s: f64) -> SimTime {
        SimTime::from_secs_f64(s)
    }

    #[test]
    fn test_event_key_ordering() {
        let earlier = EventKey { time: secs(1.0), sequence: 7 };
        let later = EventKey { time: secs(2.0), sequence: 1 };
        assert!(earlier < later);

        let first = EventKey { time: secs(1.0), sequence: 1 };
        let second = EventKey { time: secs(1.0), sequence: 2 };
        assert!(first < second, "equal times fall back to insertion order");
    }

    #[test]
    fn dispatches_in_time_then_fifo_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(beacon(3), secs(2.0)).unwrap();
        scheduler.schedule(beacon(1), secs(1.0)).unwrap();
        scheduler.schedule(beacon(2), secs(1.0)).unwrap();

        let mut recorder = Recorder::default();
        let outcome = scheduler.run(secs(10.0), &mut recorder).unwrap();

        assert_eq!(outcome, RunOutcome::QueueExhausted);
        let order: Vec<Event> = recorder.seen.iter().map(|(_, e)| *e).collect();
        assert_eq!(order, vec![beacon(1), beacon(2), beacon(3)]);
        assert_eq!(recorder.seen[2].0, secs(2.0));
        assert_eq!(scheduler.dispatched(), 3);
    }

    #[test]
    fn rejects_scheduling_into_the_past() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(beacon(0), secs(5.0)).unwrap();
        let mut recorder = Recorder::default();
        scheduler.run(secs(10.0), &mut recorder).unwrap();

        let err = scheduler.schedule(beacon(0), secs(4.0)).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidTime { .. }));
        // Scheduling at exactly now is allowed.
        scheduler.schedule(beacon(0), secs(5.0)).unwrap();
    }

    #[test]
    fn stop_event_halts_dispatch() {
        let mut scheduler = Scheduler::new();
        scheduler.stop(secs(3.0)).unwrap();
        scheduler.schedule(beacon(0), secs(1.0)).unwrap();
        scheduler.schedule(beacon(1), secs(3.0)).unwrap();
        scheduler.schedule(beacon(2), secs(4.0)).unwrap();

        let mut recorder = Recorder::default();
        let outcome = scheduler.run(secs(100.0), &mut recorder).unwrap();

        assert_eq!(outcome, RunOutcome::Stopped);
        assert!(scheduler.is_stopped());
        // The stop was inserted before beacon(1), so it wins the tie at t=3.
        assert_eq!(recorder.seen.len(), 2);
        assert_eq!(recorder.seen[1].1, Event::SimulationStop);
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn stop_placed_at_the_stop_time_ends_the_run_there() {
        let mut scheduler = Scheduler::new();
        scheduler.stop(secs(2.0)).unwrap();
        scheduler.schedule(beacon(0), secs(1.0)).unwrap();
        scheduler.schedule(beacon(1), secs(2.0)).unwrap();

        let mut recorder = Recorder::default();
        let outcome = scheduler.run(secs(2.0), &mut recorder).unwrap();

        assert_eq!(outcome, RunOutcome::Stopped);
        assert_eq!(recorder.seen, vec![(secs(1.0), beacon(0)), (secs(2.0), Event::SimulationStop)]);
        assert_eq!(scheduler.peek_time(), Some(secs(2.0)));
    }

    #[test]
    fn delays_past_the_end_of_time_are_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(beacon(0), secs(1.0)).unwrap();
        let mut recorder = Recorder::default();
        scheduler.run(secs(1.0), &mut recorder).unwrap();

        let err = scheduler.schedule_in(beacon(0), Duration::MAX).unwrap_err();
        assert!(matches!(err, SimulationError::TimeOverflow { .. }));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn events_beyond_stop_time_are_left_pending() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(beacon(0), secs(1.0)).unwrap();
        scheduler.schedule(beacon(0), secs(2.0)).unwrap();
        scheduler.schedule(beacon(0), secs(2.5)).unwrap();

        let mut recorder = Recorder::default();
        let outcome = scheduler.run(secs(2.0), &mut recorder).unwrap();

        assert_eq!(outcome, RunOutcome::StopTimeReached);
        assert_eq!(recorder.seen.len(), 2);
        assert_eq!(scheduler.now(), secs(2.0));
        assert_eq!(scheduler.peek_time(), Some(secs(2.5)));
    }

    #[test]
    fn handlers_can_schedule_follow_ups() {
        struct Chain {
            remaining: u32,
            times: Vec<SimTime>,
        }

        impl EventHandler for Chain {
            fn handle(&mut self, event: Event, scheduler: &mut Scheduler) -> Result<(), SimulationError> {
                self.times.push(scheduler.now());
                if self.remaining > 0 {
                    self.remaining -= 1;
                    scheduler.schedule_in(event, Duration::from_millis(250))?;
                }
                Ok(())
            }
        }

        let mut scheduler = Scheduler::new();
        let follow_up = Event::RadioStateChange {
            device: 1,
            change: RadioChange::ReceptionComplete {
                packet: Some(PacketRef { flow: 1, index: 0 }),
            },
        };
        scheduler.schedule(follow_up, SimTime::ZERO).unwrap();
        let mut chain = Chain { remaining: 3, times: Vec::new() };
        scheduler.run(secs(10.0), &mut chain).unwrap();

        assert_eq!(chain.times, vec![secs(0.0), secs(0.25), secs(0.5), secs(0.75)]);
    }
}
