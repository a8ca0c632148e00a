//! Actuation policy for the planter: maps the latest sensor reading and the
//! profile thresholds to pump/fan commands.
//!
//! The evaluator is pure. It never touches the actuators; it only proposes a
//! [`Decision`] whose `next_state` the caller commits once the writes are
//! confirmed.

use std::time::Duration;

use planter_types::{Actuator, ActuatorCommand, ActuatorState, Millis, SensorReading, Thresholds};
use serde::{Deserialize, Serialize};

pub mod alerts;
pub mod safety;
pub mod telemetry;

pub use alerts::{detect_alerts, AlertThrottle, ALERT_COOLDOWN_MS, WATER_EMPTY_BELOW_PERCENT};
pub use safety::{apply_safety_limits, fallback_care, RawCare, SafetyLimits};
pub use telemetry::{normalize, sanitize};

/// How long one watering runs before the pump is forced off.
pub const WATERING_DURATION_MS: Millis = 10_000;
/// Minimum interval between the starts of two waterings.
pub const WATERING_COOLDOWN_MS: Millis = 300_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationTimings {
    pub watering_duration_ms: Millis,
    pub watering_cooldown_ms: Millis,
}

impl Default for ActuationTimings {
    fn default() -> Self {
        Self {
            watering_duration_ms: WATERING_DURATION_MS,
            watering_cooldown_ms: WATERING_COOLDOWN_MS,
        }
    }
}

/// Outcome of one evaluation. `None` commands mean "leave as is".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub pump: Option<ActuatorCommand>,
    pub fan: Option<ActuatorCommand>,
    pub next_state: ActuatorState,
    /// Set when `pump` starts a watering: the pump must be switched off after this delay.
    pub pump_off_after: Option<Duration>,
}

impl Decision {
    fn unchanged(state: &ActuatorState) -> Self {
        Self {
            pump: None,
            fan: None,
            next_state: *state,
            pump_off_after: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.pump.is_none() && self.fan.is_none()
    }

    pub fn commands(&self) -> impl Iterator<Item = ActuatorCommand> + '_ {
        self.pump.iter().chain(self.fan.iter()).copied()
    }
}

/// A manual pump start refused because the last watering is too recent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoolingDown {
    pub remaining_ms: Millis,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyEvaluator {
    timings: ActuationTimings,
}

impl PolicyEvaluator {
    pub fn new(timings: ActuationTimings) -> Self {
        Self { timings }
    }

    pub fn timings(&self) -> ActuationTimings {
        self.timings
    }

    pub fn watering_duration(&self) -> Duration {
        Duration::from_millis(self.timings.watering_duration_ms)
    }

    pub fn evaluate(
        &self,
        reading: &SensorReading,
        thresholds: &Thresholds,
        state: &ActuatorState,
        now: Millis,
    ) -> Decision {
        let reading = sanitize(reading);
        let mut decision = Decision::unchanged(state);

        if state.pump_on {
            if self.watering_overdue(state, now) {
                decision.pump = Some(ActuatorCommand::off(Actuator::Pump));
                decision.next_state.pump_on = false;
            }
        } else if let Some(soil) = reading.soil_moisture_percent {
            if soil < thresholds.target_moisture_percent as f32 && self.cooldown_elapsed(state, now) {
                decision.pump = Some(ActuatorCommand::on(Actuator::Pump));
                decision.next_state.pump_on = true;
                decision.next_state.last_watering_start =
                    Some(state.last_watering_start.map_or(now, |last| last.max(now)));
                decision.pump_off_after = Some(self.watering_duration());
            }
        }

        if let Some(temp) = reading.temperature_celsius {
            let max = thresholds.max_temperature_celsius as f32;
            if temp > max && !state.fan_on {
                decision.fan = Some(ActuatorCommand::on(Actuator::Fan));
                decision.next_state.fan_on = true;
            } else if temp < max && state.fan_on {
                decision.fan = Some(ActuatorCommand::off(Actuator::Fan));
                decision.next_state.fan_on = false;
            }
        }

        decision
    }

    /// Decide a manual switch. Switching to the current state is a no-op and
    /// a manual pump start obeys the same cooldown as an automatic one.
    pub fn manual(
        &self,
        command: ActuatorCommand,
        state: &ActuatorState,
        now: Millis,
    ) -> Result<Decision, CoolingDown> {
        let mut decision = Decision::unchanged(state);
        if state.is_on(command.actuator) == command.on {
            return Ok(decision);
        }
        if command.actuator == Actuator::Pump && command.on {
            if !self.cooldown_elapsed(state, now) {
                return Err(CoolingDown {
                    remaining_ms: self.cooldown_remaining(state, now),
                });
            }
            decision.next_state.last_watering_start =
                Some(state.last_watering_start.map_or(now, |last| last.max(now)));
            decision.pump_off_after = Some(self.watering_duration());
        }
        decision.next_state.set(command.actuator, command.on);
        match command.actuator {
            Actuator::Pump => decision.pump = Some(command),
            Actuator::Fan => decision.fan = Some(command),
        }
        Ok(decision)
    }

    /// True when no watering has started within the cooldown window.
    pub fn cooldown_elapsed(&self, state: &ActuatorState, now: Millis) -> bool {
        match state.last_watering_start {
            None => true,
            Some(last) => now.saturating_sub(last) > self.timings.watering_cooldown_ms,
        }
    }

    fn cooldown_remaining(&self, state: &ActuatorState, now: Millis) -> Millis {
        match state.last_watering_start {
            None => 0,
            Some(last) => (last + self.timings.watering_cooldown_ms + 1).saturating_sub(now),
        }
    }

    // The scheduled stop owns the exact deadline; this only catches a stop
    // that was lost or failed to reach the pump.
    fn watering_overdue(&self, state: &ActuatorState, now: Millis) -> bool {
        match state.last_watering_start {
            None => false,
            Some(last) => now.saturating_sub(last) > self.timings.watering_duration_ms,
        }
    }
}

/// Evaluate with the default watering duration and cooldown.
pub fn evaluate(
    reading: &SensorReading,
    thresholds: &Thresholds,
    state: &ActuatorState,
    now: Millis,
) -> Decision {
    PolicyEvaluator::default().evaluate(reading, thresholds, state, now)
}
