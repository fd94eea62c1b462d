//! Per-device energy model.
//!
//! Integrates `current(state) × duration × supply voltage` over the radio's
//! state history against a finite budget. The budget is clamped at zero and
//! depletion is permanent (no recharge). Energy actually drawn is attributed
//! to the state active while it was drawn, so the per-state ledger always sums
//! to the running total.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::radio::RadioState;

/// Current draw per radio state and supply voltage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnergyParameters {
    /// Transmit current in amperes (17.4 mA).
    pub tx_current_a: f64,
    /// Receive current in amperes (19.7 mA).
    pub rx_current_a: f64,
    /// Idle current in amperes (0.6 mA).
    pub idle_current_a: f64,
    /// Supply voltage in volts.
    pub supply_voltage_v: f64,
}

impl Default for EnergyParameters {
    fn default() -> Self {
        EnergyParameters {
            tx_current_a: 0.0174,
            rx_current_a: 0.0197,
            idle_current_a: 0.0006,
            supply_voltage_v: 3.0,
        }
    }
}

impl EnergyParameters {
    /// Configured current draw for `state`.
    pub fn current(&self, state: RadioState) -> f64 {
        match state {
            RadioState::Idle => self.idle_current_a,
            RadioState::Transmitting => self.tx_current_a,
            RadioState::Receiving => self.rx_current_a,
        }
    }

    /// Power draw in watts for `state`.
    pub fn power(&self, state: RadioState) -> f64 {
        self.current(state) * self.supply_voltage_v
    }
}

/// Energy drawn in each radio state (Joules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StateEnergy {
    pub idle_j: f64,
    pub tx_j: f64,
    pub rx_j: f64,
}

impl StateEnergy {
    pub fn total(&self) -> f64 {
        self.idle_j + self.tx_j + self.rx_j
    }

    fn add(&mut self, state: RadioState, joules: f64) {
        match state {
            RadioState::Idle => self.idle_j += joules,
            RadioState::Transmitting => self.tx_j += joules,
            RadioState::Receiving => self.rx_j += joules,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnergyModel {
    params: EnergyParameters,
    initial_j: f64,
    remaining_j: f64,
    ledger: StateEnergy,
}

impl EnergyModel {
    /// Create a model holding `initial_j` Joules. `f64::INFINITY` gives an unlimited budget.
    pub fn new(params: EnergyParameters, initial_j: f64) -> Self {
        EnergyModel {
            params,
            initial_j,
            remaining_j: initial_j,
            ledger: StateEnergy::default(),
        }
    }

    pub fn initial_energy(&self) -> f64 {
        self.initial_j
    }

    pub fn remaining_energy(&self) -> f64 {
        self.remaining_j
    }

    pub fn is_depleted(&self) -> bool {
        self.remaining_j <= 0.0
    }

    /// Energy drawn so far, split by radio state.
    pub fn ledger(&self) -> StateEnergy {
        self.ledger
    }

    /// Energy consumed since the start of the run: `initial - remaining`.
    ///
    /// For an unlimited budget the sum of all draws is returned instead.
    pub fn total_consumed(&self) -> f64 {
        if self.initial_j.is_finite() {
            self.initial_j - self.remaining_j
        } else {
            self.ledger.total()
        }
    }

    /// Integrate `duration` spent in `state` against the budget.
    ///
    /// # Returns
    ///
    /// `Some(offset)` when this interval exhausted the budget, where `offset`
    /// is how far into the interval the budget reached zero. `None` otherwise,
    /// including when the device was already depleted.
    pub fn on_state_duration(&mut self, state: RadioState, duration: Duration) -> Option<Duration> {
        if self.is_depleted() || duration.is_zero() {
            return None;
        }
        let power = self.params.power(state);
        let demand = power * duration.as_secs_f64();
        if demand < self.remaining_j {
            self.remaining_j -= demand;
            self.ledger.add(state, demand);
            return None;
        }

        let drawn = self.remaining_j;
        self.ledger.add(state, drawn);
        self.remaining_j = 0.0;
        let offset = if power > 0.0 {
            Duration::try_from_secs_f64(drawn / power).map_or(duration, |offset| offset.min(duration))
        } else {
            duration
        };
        Some(offset)
    }
}
