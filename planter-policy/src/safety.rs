use planter_types::CareProfile;
use serde::{Deserialize, Serialize};

/// Care parameters as suggested by the language model, before clamping.
/// Zero is treated like a missing value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCare {
    #[serde(default)]
    pub moisture_percent: Option<i32>,
    #[serde(default)]
    pub min_temp: Option<i32>,
    #[serde(default)]
    pub max_temp: Option<i32>,
    #[serde(default, alias = "watering_freq")]
    pub watering_frequency: Option<String>,
    #[serde(default, alias = "watering_desc")]
    pub watering_description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub min_moisture: i32,
    pub max_moisture: i32,
    pub min_temp_limit: i32,
    pub max_temp_limit: i32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            min_moisture: 10,
            max_moisture: 90,
            min_temp_limit: 5,
            max_temp_limit: 45,
        }
    }
}

/// Used when the care advisor is unreachable or answers garbage.
pub fn fallback_care() -> RawCare {
    RawCare {
        moisture_percent: Some(40),
        min_temp: Some(18),
        max_temp: Some(30),
        watering_frequency: Some("as needed".into()),
        watering_description: Some("regular watering".into()),
    }
}

fn non_zero(v: Option<i32>) -> Option<i32> {
    v.filter(|x| *x != 0)
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

pub fn apply_safety_limits(raw: &RawCare) -> CareProfile {
    apply_limits(raw, &SafetyLimits::default())
}

pub fn apply_limits(raw: &RawCare, limits: &SafetyLimits) -> CareProfile {
    let moisture = non_zero(raw.moisture_percent).unwrap_or(40);
    CareProfile {
        moisture_percent: moisture.clamp(limits.min_moisture, limits.max_moisture),
        min_temp: non_zero(raw.min_temp).unwrap_or(15).max(limits.min_temp_limit),
        max_temp: non_zero(raw.max_temp).unwrap_or(30).min(limits.max_temp_limit),
        watering_frequency: non_blank(&raw.watering_frequency).unwrap_or_else(|| "varies".into()),
        watering_description: non_blank(&raw.watering_description)
            .unwrap_or_else(|| "adjusted watering".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_extreme_suggestions() {
        let raw = RawCare {
            moisture_percent: Some(97),
            min_temp: Some(-3),
            max_temp: Some(60),
            ..Default::default()
        };
        let care = apply_safety_limits(&raw);
        assert_eq!(care.moisture_percent, 90);
        assert_eq!(care.min_temp, 5);
        assert_eq!(care.max_temp, 45);
        assert_eq!(care.watering_frequency, "varies");
    }

    #[test]
    fn missing_or_zero_values_take_defaults() {
        let raw = RawCare {
            moisture_percent: Some(0),
            ..Default::default()
        };
        let care = apply_safety_limits(&raw);
        assert_eq!(care.moisture_percent, 40);
        assert_eq!(care.min_temp, 15);
        assert_eq!(care.max_temp, 30);
    }

    #[test]
    fn low_moisture_raised_to_floor() {
        let care = apply_safety_limits(&RawCare {
            moisture_percent: Some(3),
            ..Default::default()
        });
        assert_eq!(care.moisture_percent, 10);
    }

    #[test]
    fn parses_model_field_names() {
        let raw: RawCare = serde_json::from_str(
            r#"{"moisture_percent":35,"min_temp":16,"max_temp":28,"watering_freq":"twice a week","watering_desc":"soak"}"#,
        )
        .unwrap();
        assert_eq!(raw.watering_frequency.as_deref(), Some("twice a week"));
        assert_eq!(apply_safety_limits(&raw).moisture_percent, 35);
    }
}
