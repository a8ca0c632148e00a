use planter_policy::{detect_alerts, sanitize, AlertThrottle, PolicyEvaluator};
use planter_types::{
    Actuator, ActuatorCommand, ActuatorState, AlertKind, Millis, SensorReading, Thresholds,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    Command(ActuatorCommand),
    Alert(AlertKind),
}

/// Offline stand-in for a device reactor: feeds readings through the policy
/// on a virtual clock and treats every write as confirmed. The scheduled
/// pump stop is emitted at its deadline, before the first reading past it.
pub struct Replayer {
    evaluator: PolicyEvaluator,
    thresholds: Thresholds,
    throttle: AlertThrottle,
    state: ActuatorState,
    pump_stop_at: Option<Millis>,
}

impl Replayer {
    pub fn new(evaluator: PolicyEvaluator, thresholds: Thresholds, alert_cooldown_ms: Millis) -> Self {
        Self {
            evaluator,
            thresholds,
            throttle: AlertThrottle::new(alert_cooldown_ms),
            state: ActuatorState::default(),
            pump_stop_at: None,
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn step(&mut self, reading: &SensorReading, now: Millis) -> Vec<(Millis, Entry)> {
        let mut out = self.expire(now);
        let reading = sanitize(reading);
        if reading.is_empty() {
            return out;
        }

        for kind in detect_alerts(&reading, &self.thresholds) {
            if self.throttle.admit(kind, now) {
                out.push((now, Entry::Alert(kind)));
            }
        }

        let decision = self
            .evaluator
            .evaluate(&reading, &self.thresholds, &self.state, now);
        out.extend(decision.commands().map(|c| (now, Entry::Command(c))));
        if let Some(pump) = decision.pump {
            self.pump_stop_at = match decision.pump_off_after {
                Some(after) if pump.on => Some(now + after.as_millis() as Millis),
                _ => None,
            };
        }
        self.state = decision.next_state;
        out
    }

    /// Flush a pump stop still pending after the last reading.
    pub fn finish(&mut self) -> Vec<(Millis, Entry)> {
        self.expire(Millis::MAX)
    }

    fn expire(&mut self, now: Millis) -> Vec<(Millis, Entry)> {
        match self.pump_stop_at {
            Some(at) if at <= now => {
                self.pump_stop_at = None;
                if self.state.pump_on {
                    self.state.pump_on = false;
                    return vec![(at, Entry::Command(ActuatorCommand::off(Actuator::Pump)))];
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}
