use planter_types::{RawTelemetry, SensorReading};

/// Full-scale value of the soil probe ADC (bone dry).
pub const SOIL_RAW_MAX: f32 = 210.0;

fn percent(v: Option<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite()).map(|x| x.clamp(0.0, 100.0))
}

/// Clamp every channel to its valid range and drop non-finite values.
/// Noise is expected, so nothing is rejected outright.
pub fn sanitize(reading: &SensorReading) -> SensorReading {
    SensorReading {
        soil_moisture_percent: percent(reading.soil_moisture_percent),
        temperature_celsius: reading.temperature_celsius.filter(|t| t.is_finite()),
        humidity_percent: percent(reading.humidity_percent),
        water_level_percent: percent(reading.water_level_percent),
        distance_cm: reading
            .distance_cm
            .filter(|d| d.is_finite())
            .map(|d| d.max(0.0)),
    }
}

/// Convert a board frame into percentages. Soil is inverted: a raw 0 is saturated soil.
pub fn normalize(raw: &RawTelemetry) -> SensorReading {
    let soil = raw
        .soil_raw
        .filter(|v| v.is_finite())
        .map(|v| (100.0 - v.clamp(0.0, SOIL_RAW_MAX) / SOIL_RAW_MAX * 100.0).round());
    sanitize(&SensorReading {
        soil_moisture_percent: soil,
        temperature_celsius: raw.temperature,
        humidity_percent: raw.humidity,
        water_level_percent: raw.water_level,
        distance_cm: raw.distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soil_raw_maps_to_inverted_percent() {
        let at = |c: f32| {
            normalize(&RawTelemetry {
                soil_raw: Some(c),
                ..Default::default()
            })
            .soil_moisture_percent
        };
        assert_eq!(at(0.0), Some(100.0));
        assert_eq!(at(210.0), Some(0.0));
        assert_eq!(at(105.0), Some(50.0));
        assert_eq!(at(999.0), Some(0.0));
        assert_eq!(at(-4.0), Some(100.0));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let r = sanitize(&SensorReading {
            humidity_percent: Some(140.0),
            water_level_percent: Some(-3.0),
            distance_cm: Some(-1.5),
            temperature_celsius: Some(f32::NAN),
            ..Default::default()
        });
        assert_eq!(r.humidity_percent, Some(100.0));
        assert_eq!(r.water_level_percent, Some(0.0));
        assert_eq!(r.distance_cm, Some(0.0));
        assert_eq!(r.temperature_celsius, None);
    }

    #[test]
    fn absent_channels_stay_absent() {
        let r = normalize(&RawTelemetry {
            temperature: Some(24.5),
            ..Default::default()
        });
        assert_eq!(r.temperature_celsius, Some(24.5));
        assert!(r.soil_moisture_percent.is_none());
        assert!(r.water_level_percent.is_none());
    }
}
