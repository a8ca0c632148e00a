use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use planter_types::{ActuatorCommand, Alert, PlantProfile, ProfileId, SensorReading};
use thiserror::Error;

pub mod file;
pub use file::JsonFileProfileStore;

pub mod memory;
pub use memory::{InMemoryProfileStore, LogAlertSink, RecordingActuatorSink, RecordingAlertSink};

pub mod rtdb;
pub use rtdb::{RtdbActuatorSink, RtdbClient, RtdbProfileStore};

pub mod source;
pub use source::{parse_frame, ChannelSensorSource, JsonLinesSensorSource};

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator store unreachable: {0}")]
    Transport(String),
    #[error("actuator store rejected write with status {0}")]
    Status(u16),
    #[error("actuator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("remote store error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(String),
    #[error("bad frame: {0}")]
    BadFrame(String),
    #[error("sensor source already subscribed")]
    AlreadySubscribed,
}

pub type ReadingStream = Pin<Box<dyn Stream<Item = Result<SensorReading, SourceError>> + Send>>;

/// Shared store the physical actuators listen on. Writes for one actuator
/// are ordered; nothing is promised across actuators.
#[async_trait]
pub trait ActuatorSink: Send + Sync {
    async fn apply(&self, command: ActuatorCommand) -> Result<(), ActuatorError>;
}

/// Persistent plant profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn put(&self, profile: PlantProfile) -> Result<(), StoreError>;

    async fn get(&self, id: &ProfileId) -> Result<Option<PlantProfile>, StoreError>;

    /// Returns whether a profile was removed.
    async fn remove(&self, id: &ProfileId) -> Result<bool, StoreError>;

    /// All profiles, the hardware-backed one first.
    async fn list(&self) -> Result<Vec<PlantProfile>, StoreError>;
}

/// Push-based sensor feed.
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn subscribe(&self) -> Result<ReadingStream, SourceError>;
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: &Alert);
}

/// Accepts every write and drives nothing.
pub struct NullActuatorSink;

#[async_trait]
impl ActuatorSink for NullActuatorSink {
    async fn apply(&self, _command: ActuatorCommand) -> Result<(), ActuatorError> {
        Ok(())
    }
}

pub(crate) fn sort_profiles(profiles: &mut [PlantProfile]) {
    profiles.sort_by(|a, b| b.is_real().cmp(&a.is_real()).then_with(|| a.id.cmp(&b.id)));
}
