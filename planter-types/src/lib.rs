use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Milliseconds since the Unix epoch (or any fixed origin the caller picks).
pub type Millis = u64;

/// Id of the single hardware-backed profile.
pub const REAL_PROFILE_ID: &str = "real-planter-card";

/// Latest known sensor values. Every channel arrives independently, so each
/// field is optional; an absent field means "no new information".
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_moisture_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_level_percent: Option<f32>,
    /// Ultrasonic range to the canopy; display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_cm: Option<f32>,
}

impl SensorReading {
    pub fn soil(percent: f32) -> Self {
        Self {
            soil_moisture_percent: Some(percent),
            ..Default::default()
        }
    }

    pub fn temperature(celsius: f32) -> Self {
        Self {
            temperature_celsius: Some(celsius),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.soil_moisture_percent.is_none()
            && self.temperature_celsius.is_none()
            && self.humidity_percent.is_none()
            && self.water_level_percent.is_none()
            && self.distance_cm.is_none()
    }

    /// Overlay the channels present in `newer` onto `self`.
    pub fn merge(&mut self, newer: &SensorReading) {
        if newer.soil_moisture_percent.is_some() {
            self.soil_moisture_percent = newer.soil_moisture_percent;
        }
        if newer.temperature_celsius.is_some() {
            self.temperature_celsius = newer.temperature_celsius;
        }
        if newer.humidity_percent.is_some() {
            self.humidity_percent = newer.humidity_percent;
        }
        if newer.water_level_percent.is_some() {
            self.water_level_percent = newer.water_level_percent;
        }
        if newer.distance_cm.is_some() {
            self.distance_cm = newer.distance_cm;
        }
    }
}

/// Device-native telemetry frame as published by the planter board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetry {
    /// Distance in cm.
    #[serde(rename = "A", default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    /// Water tank level in percent.
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub water_level: Option<f32>,
    /// Raw soil ADC value, 0 (wet) ..= 210 (dry).
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub soil_raw: Option<f32>,
    #[serde(rename = "TEMP", default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(rename = "HUMIDITY", default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f32>,
}

/// Boundary values the actuation policy compares readings against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub target_moisture_percent: i32,
    pub max_temperature_celsius: i32,
    #[serde(default)]
    pub min_temperature_celsius: Option<i32>,
}

impl Thresholds {
    pub fn new(target_moisture_percent: i32, max_temperature_celsius: i32) -> Self {
        Self {
            target_moisture_percent,
            max_temperature_celsius,
            min_temperature_celsius: None,
        }
    }
}

impl From<&CareProfile> for Thresholds {
    fn from(care: &CareProfile) -> Self {
        Self {
            target_moisture_percent: care.moisture_percent,
            max_temperature_celsius: care.max_temp,
            min_temperature_celsius: Some(care.min_temp),
        }
    }
}

/// Committed on/off state of one device's actuators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub pump_on: bool,
    pub fan_on: bool,
    /// Start of the most recent watering; `None` until the first one.
    pub last_watering_start: Option<Millis>,
}

impl ActuatorState {
    pub fn is_on(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Pump => self.pump_on,
            Actuator::Fan => self.fan_on,
        }
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Pump => self.pump_on = on,
            Actuator::Fan => self.fan_on = on,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actuator {
    Pump,
    Fan,
}

impl Actuator {
    pub const ALL: [Actuator; 2] = [Actuator::Pump, Actuator::Fan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Actuator::Pump => "pump",
            Actuator::Fan => "fan",
        }
    }

    /// Field name of the mirrored status flag in the realtime store.
    pub fn status_field(&self) -> &'static str {
        match self {
            Actuator::Pump => "pump_status",
            Actuator::Fan => "fan_status",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Actuator::Pump => 0,
            Actuator::Fan => 1,
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Actuator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pump" => Ok(Actuator::Pump),
            "fan" => Ok(Actuator::Fan),
            other => Err(format!("unknown actuator: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub actuator: Actuator,
    pub on: bool,
}

impl ActuatorCommand {
    pub fn on(actuator: Actuator) -> Self {
        Self { actuator, on: true }
    }

    pub fn off(actuator: Actuator) -> Self {
        Self { actuator, on: false }
    }

    /// Control byte understood by the planter board.
    pub fn wire_code(&self) -> u8 {
        match (self.actuator, self.on) {
            (Actuator::Pump, true) => 129,
            (Actuator::Pump, false) => 128,
            (Actuator::Fan, true) => 65,
            (Actuator::Fan, false) => 64,
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.actuator, if self.on { "on" } else { "off" })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    WaterTankEmpty,
    DrySoil,
    HighTemperature,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [
        AlertKind::WaterTankEmpty,
        AlertKind::DrySoil,
        AlertKind::HighTemperature,
    ];

    pub fn index(&self) -> usize {
        match self {
            AlertKind::WaterTankEmpty => 0,
            AlertKind::DrySoil => 1,
            AlertKind::HighTemperature => 2,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::WaterTankEmpty => "Water tank empty",
            AlertKind::DrySoil => "Dry soil",
            AlertKind::HighTemperature => "High temperature",
        }
    }
}

/// Per-profile alert texts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessages {
    #[serde(default = "default_water_msg")]
    pub water: String,
    #[serde(default = "default_soil_msg")]
    pub soil: String,
    #[serde(default = "default_temp_msg")]
    pub temp: String,
}

fn default_water_msg() -> String {
    "Alert: the water tank is empty!".into()
}

fn default_soil_msg() -> String {
    "Alert: the soil is dry, watering...".into()
}

fn default_temp_msg() -> String {
    "Alert: too hot! Turning on the fan.".into()
}

impl Default for AlertMessages {
    fn default() -> Self {
        Self {
            water: default_water_msg(),
            soil: default_soil_msg(),
            temp: default_temp_msg(),
        }
    }
}

impl AlertMessages {
    pub fn for_kind(&self, kind: AlertKind) -> &str {
        match kind {
            AlertKind::WaterTankEmpty => &self.water,
            AlertKind::DrySoil => &self.soil,
            AlertKind::HighTemperature => &self.temp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub profile_id: ProfileId,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub at: Millis,
}

/// Care parameters after safety limits have been applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareProfile {
    pub moisture_percent: i32,
    pub min_temp: i32,
    pub max_temp: i32,
    pub watering_frequency: String,
    pub watering_description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Backed by the physical planter.
    Real,
    /// Display-only.
    Sim,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn real() -> Self {
        Self(REAL_PROFILE_ID.into())
    }

    pub fn new_sim() -> Self {
        Self(format!("sim-{}", Uuid::new_v4()))
    }

    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Real => Self::real(),
            ProfileKind::Sim => Self::new_sim(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantProfile {
    pub id: ProfileId,
    pub kind: ProfileKind,
    pub name: String,
    pub care: CareProfile,
    /// Data URL or base64 of the photo used for identification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub messages: AlertMessages,
}

impl PlantProfile {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from(&self.care)
    }

    pub fn is_real(&self) -> bool {
        self.kind == ProfileKind::Real
    }
}

/// Point-in-time view of one device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub latest: SensorReading,
    pub actuators: ActuatorState,
    pub pump_stop_pending: bool,
}
