use planter_types::{AlertKind, Millis, SensorReading, Thresholds};

/// Minimum gap between two alerts of the same kind.
pub const ALERT_COOLDOWN_MS: Millis = 10_000;

/// Water level (percent) below which the tank counts as empty.
pub const WATER_EMPTY_BELOW_PERCENT: f32 = 2.0;

/// Alert conditions present in `reading`. Absent channels raise nothing.
pub fn detect_alerts(reading: &SensorReading, thresholds: &Thresholds) -> Vec<AlertKind> {
    let reading = crate::sanitize(reading);
    let mut out = Vec::new();
    if let Some(level) = reading.water_level_percent {
        if level < WATER_EMPTY_BELOW_PERCENT {
            out.push(AlertKind::WaterTankEmpty);
        }
    }
    if let Some(soil) = reading.soil_moisture_percent {
        if soil < thresholds.target_moisture_percent as f32 {
            out.push(AlertKind::DrySoil);
        }
    }
    if let Some(temp) = reading.temperature_celsius {
        if temp > thresholds.max_temperature_celsius as f32 {
            out.push(AlertKind::HighTemperature);
        }
    }
    out
}

/// Rate limiter with an independent window per alert kind.
#[derive(Clone, Debug)]
pub struct AlertThrottle {
    cooldown_ms: Millis,
    last: [Option<Millis>; 3],
}

impl Default for AlertThrottle {
    fn default() -> Self {
        Self::new(ALERT_COOLDOWN_MS)
    }
}

impl AlertThrottle {
    pub fn new(cooldown_ms: Millis) -> Self {
        Self {
            cooldown_ms,
            last: [None; 3],
        }
    }

    /// Returns true (and records `now`) when an alert of `kind` may be raised.
    pub fn admit(&mut self, kind: AlertKind, now: Millis) -> bool {
        let slot = &mut self.last[kind.index()];
        if let Some(prev) = *slot {
            if now.saturating_sub(prev) < self.cooldown_ms {
                return false;
            }
        }
        *slot = Some(now);
        true
    }
}
