//! Per-device radio state machine.
//!
//! A device is in exactly one of Idle, Transmitting or Receiving at any time.
//! Several receptions may overlap and a transmission may start while frames
//! are still arriving; the active state is Transmitting if any transmission
//! is in progress, else Receiving if any reception is, else Idle.
//!
//! Every transition returns a [`StateDuration`] for the state being left, which
//! the energy model must consume before anything else happens on the device.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::types::SimTime;

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    Idle,
    Transmitting,
    Receiving,
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioState::Idle => write!(f, "idle"),
            RadioState::Transmitting => write!(f, "tx"),
            RadioState::Receiving => write!(f, "rx"),
        }
    }
}

/// Time spent in a state, emitted when the state is left (or settled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDuration {
    pub state: RadioState,
    /// When the state was entered (or last settled).
    pub since: SimTime,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct RadioStateMachine {
    state: RadioState,
    entered_at: SimTime,
    active_transmissions: u32,
    active_receptions: u32,
}

impl RadioStateMachine {
    /// Radios start Idle.
    pub fn new(at: SimTime) -> Self {
        RadioStateMachine {
            state: RadioState::Idle,
            entered_at: at,
            active_transmissions: 0,
            active_receptions: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> RadioState {
        self.state
    }

    #[cfg(test)]
    pub fn entered_at(&self) -> SimTime {
        self.entered_at
    }

    /// Close the current accounting interval at `now` without changing state.
    pub fn settle(&mut self, now: SimTime) -> StateDuration {
        let record = StateDuration {
            state: self.state,
            since: self.entered_at,
            duration: now.saturating_duration_since(self.entered_at),
        };
        if now > self.entered_at {
            self.entered_at = now;
        }
        record
    }

    pub fn begin_transmission(&mut self, now: SimTime) -> StateDuration {
        let record = self.settle(now);
        self.active_transmissions += 1;
        self.refresh();
        record
    }

    pub fn end_transmission(&mut self, now: SimTime) -> StateDuration {
        let record = self.settle(now);
        self.active_transmissions = self.active_transmissions.saturating_sub(1);
        self.refresh();
        record
    }

    pub fn begin_reception(&mut self, now: SimTime) -> StateDuration {
        let record = self.settle(now);
        self.active_receptions += 1;
        self.refresh();
        record
    }

    pub fn end_reception(&mut self, now: SimTime) -> StateDuration {
        let record = self.settle(now);
        self.active_receptions = self.active_receptions.saturating_sub(1);
        self.refresh();
        record
    }

    fn refresh(&mut self) {
        self.state = if self.active_transmissions > 0 {
            RadioState::Transmitting
        } else if self.active_receptions > 0 {
            RadioState::Receiving
        } else {
            RadioState::Idle
        };
    }
}
