use std::{collections::HashMap, sync::Arc};

use futures_util::StreamExt;
use planter_policy::{ActuationTimings, PolicyEvaluator, ALERT_COOLDOWN_MS};
use planter_sched::Clock;
use planter_store::{
    ActuatorError, ActuatorSink, AlertSink, ProfileStore, SensorSource, SourceError, StoreError,
};
use planter_types::{
    Actuator, ActuatorCommand, ActuatorState, DeviceSnapshot, Millis, PlantProfile, ProfileId,
    SensorReading,
};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

pub mod config;
pub use config::{ConfigError, PlanterConfig};

mod device;
pub use device::GatedSink;
use device::{DeviceContext, DeviceEvent, DeviceHandle};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("profile not found: {0}")]
    NotFound(ProfileId),
    #[error("profile {0} is not hardware-backed")]
    NotHardware(ProfileId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("pump is cooling down, {remaining_ms} ms left")]
    CoolingDown { remaining_ms: Millis },
    #[error("device {0} is not running")]
    DeviceGone(ProfileId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Clone, Copy, Debug)]
pub struct ControllerSettings {
    pub timings: ActuationTimings,
    pub alert_cooldown_ms: Millis,
    /// Pending events per device before `ingest` applies backpressure.
    pub device_queue: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            timings: ActuationTimings::default(),
            alert_cooldown_ms: ALERT_COOLDOWN_MS,
            device_queue: 64,
        }
    }
}

/// Owns the profile registry and one reactor per hardware-backed profile.
pub struct PlanterController {
    store: Arc<dyn ProfileStore>,
    sink: Arc<GatedSink>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,

    /// Running device reactors, keyed by profile.
    devices: Mutex<HashMap<ProfileId, DeviceHandle>>,
    /// Tasks forwarding an attached sensor source into a device.
    feeds: Mutex<HashMap<ProfileId, JoinHandle<()>>>,
    /// Held across every store check, write and device start or stop, so
    /// profile create, delete and restore never interleave.
    lifecycle: Mutex<()>,
}

impl PlanterController {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        sink: Arc<dyn ActuatorSink>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            sink: Arc::new(GatedSink::new(sink)),
            alerts,
            clock,
            settings,
            devices: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            lifecycle: Mutex::new(()),
        }
    }

    /// Start reactors for hardware-backed profiles already in the store.
    pub async fn restore(&self) -> Result<usize, ControllerError> {
        let _lifecycle = self.lifecycle.lock().await;
        let mut started = 0;
        for profile in self.store.list().await? {
            if profile.is_real() && !self.devices.lock().await.contains_key(&profile.id) {
                self.start_device(&profile).await;
                started += 1;
            }
        }
        Ok(started)
    }

    /// Register a profile. Only one hardware-backed profile may exist; pass
    /// `replace` to swap it out (the old device is stopped first).
    pub async fn create_profile(
        &self,
        profile: PlantProfile,
        replace: bool,
    ) -> Result<PlantProfile, ControllerError> {
        validate(&profile)?;
        let _lifecycle = self.lifecycle.lock().await;

        if profile.is_real() {
            let exists = self.store.get(&profile.id).await?.is_some()
                || self.devices.lock().await.contains_key(&profile.id);
            if exists && !replace {
                return Err(ControllerError::Conflict(
                    "a hardware-backed planter already exists".into(),
                ));
            }
            if exists {
                tracing::info!(profile = %profile.id, "replacing hardware-backed planter");
                self.stop_device(&profile.id).await;
            }
        }

        self.store.put(profile.clone()).await?;
        if profile.is_real() {
            self.start_device(&profile).await;
        }
        tracing::info!(profile = %profile.id, name = %profile.name, kind = ?profile.kind, "profile created");
        Ok(profile)
    }

    pub async fn delete_profile(&self, id: &ProfileId) -> Result<(), ControllerError> {
        let _lifecycle = self.lifecycle.lock().await;
        let removed = self.store.remove(id).await?;
        let had_device = self.stop_device(id).await;
        if !removed && !had_device {
            return Err(ControllerError::NotFound(id.clone()));
        }
        tracing::info!(profile = %id, "profile deleted");
        Ok(())
    }

    pub async fn get_profile(&self, id: &ProfileId) -> Result<PlantProfile, ControllerError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ControllerError::NotFound(id.clone()))
    }

    pub async fn list_profiles(&self) -> Result<Vec<PlantProfile>, ControllerError> {
        Ok(self.store.list().await?)
    }

    /// Queue a reading for the profile's device. Readings for one device are
    /// processed in the order they are ingested.
    pub async fn ingest(&self, id: &ProfileId, reading: SensorReading) -> Result<(), ControllerError> {
        let tx = self.device_tx(id).await?;
        tx.send(DeviceEvent::Reading(reading))
            .await
            .map_err(|_| ControllerError::DeviceGone(id.clone()))
    }

    /// Manually switch an actuator. Switching to the current state is a no-op;
    /// starting the pump inside the watering cooldown fails with `CoolingDown`.
    pub async fn manual(
        &self,
        id: &ProfileId,
        actuator: Actuator,
        on: bool,
    ) -> Result<ActuatorState, ControllerError> {
        let tx = self.device_tx(id).await?;
        let (reply, rx) = oneshot::channel();
        let command = ActuatorCommand { actuator, on };
        tx.send(DeviceEvent::Manual { command, reply })
            .await
            .map_err(|_| ControllerError::DeviceGone(id.clone()))?;
        let state = rx.await.map_err(|_| ControllerError::DeviceGone(id.clone()))??;
        Ok(state)
    }

    pub async fn snapshot(&self, id: &ProfileId) -> Result<DeviceSnapshot, ControllerError> {
        let tx = self.device_tx(id).await?;
        let (reply, rx) = oneshot::channel();
        tx.send(DeviceEvent::Snapshot(reply))
            .await
            .map_err(|_| ControllerError::DeviceGone(id.clone()))?;
        rx.await.map_err(|_| ControllerError::DeviceGone(id.clone()))
    }

    /// Forward every reading from `source` into the profile's device until
    /// the stream ends or the device is stopped. Bad frames are logged and skipped.
    pub async fn attach_source(
        &self,
        id: &ProfileId,
        source: Arc<dyn SensorSource>,
    ) -> Result<(), ControllerError> {
        let tx = self.device_tx(id).await?;
        let mut stream = source.subscribe().await?;
        let profile = id.clone();
        let feed = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(reading) => {
                        if tx.send(DeviceEvent::Reading(reading)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(profile = %profile, error = %e, "sensor frame skipped"),
                }
            }
            tracing::debug!(profile = %profile, "sensor feed ended");
        });
        if let Some(old) = self.feeds.lock().await.insert(id.clone(), feed) {
            old.abort();
        }
        Ok(())
    }

    /// Stop every device reactor.
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let ids: Vec<ProfileId> = self.devices.lock().await.keys().cloned().collect();
        for id in ids {
            self.stop_device(&id).await;
        }
    }

    async fn device_tx(
        &self,
        id: &ProfileId,
    ) -> Result<tokio::sync::mpsc::Sender<DeviceEvent>, ControllerError> {
        if let Some(handle) = self.devices.lock().await.get(id) {
            return Ok(handle.tx.clone());
        }
        match self.store.get(id).await? {
            Some(_) => Err(ControllerError::NotHardware(id.clone())),
            None => Err(ControllerError::NotFound(id.clone())),
        }
    }

    async fn start_device(&self, profile: &PlantProfile) {
        let ctx = DeviceContext {
            profile_id: profile.id.clone(),
            thresholds: profile.thresholds(),
            messages: profile.messages.clone(),
            evaluator: PolicyEvaluator::new(self.settings.timings),
            alert_cooldown_ms: self.settings.alert_cooldown_ms,
            clock: Arc::clone(&self.clock),
            sink: Arc::clone(&self.sink),
            alerts: Arc::clone(&self.alerts),
        };
        let handle = DeviceHandle::spawn(ctx, self.settings.device_queue);
        self.devices.lock().await.insert(profile.id.clone(), handle);
    }

    async fn stop_device(&self, id: &ProfileId) -> bool {
        if let Some(feed) = self.feeds.lock().await.remove(id) {
            feed.abort();
        }
        let handle = self.devices.lock().await.remove(id);
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }
}

fn validate(profile: &PlantProfile) -> Result<(), ControllerError> {
    if profile.name.trim().is_empty() {
        return Err(ControllerError::Validation("profile name is empty".into()));
    }
    if profile.is_real() && profile.id != ProfileId::real() {
        return Err(ControllerError::Validation(format!(
            "hardware-backed profile must use id {}",
            ProfileId::real()
        )));
    }
    let care = &profile.care;
    if !(0..=100).contains(&care.moisture_percent) {
        return Err(ControllerError::Validation(format!(
            "moisture target {} outside 0..=100",
            care.moisture_percent
        )));
    }
    if care.min_temp > care.max_temp {
        return Err(ControllerError::Validation(format!(
            "min temperature {} above max temperature {}",
            care.min_temp, care.max_temp
        )));
    }
    Ok(())
}
