use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use planter_types::{Actuator, ActuatorCommand, Alert, PlantProfile, ProfileId};
use tokio::sync::Mutex;

use crate::{sort_profiles, ActuatorError, ActuatorSink, AlertSink, ProfileStore, StoreError};

/// Non-durable profile store. An optional latency delays every call, which
/// makes races between overlapping callers observable in tests.
pub struct InMemoryProfileStore {
    profiles: Mutex<HashMap<ProfileId, PlantProfile>>,
    latency: Option<Duration>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: Mutex::new(HashMap::new()),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn put(&self, profile: PlantProfile) -> Result<(), StoreError> {
        self.delay().await;
        let mut inner = self.profiles.lock().await;
        inner.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn get(&self, id: &ProfileId) -> Result<Option<PlantProfile>, StoreError> {
        self.delay().await;
        let inner = self.profiles.lock().await;
        Ok(inner.get(id).cloned())
    }

    async fn remove(&self, id: &ProfileId) -> Result<bool, StoreError> {
        self.delay().await;
        let mut inner = self.profiles.lock().await;
        Ok(inner.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<PlantProfile>, StoreError> {
        self.delay().await;
        let inner = self.profiles.lock().await;
        let mut all: Vec<PlantProfile> = inner.values().cloned().collect();
        sort_profiles(&mut all);
        Ok(all)
    }
}

/// In-memory actuator sink that records confirmed commands.
///
/// Failures can be injected per actuator, and an artificial write latency
/// makes overlapping writes observable (`max_in_flight`).
pub struct RecordingActuatorSink {
    log: StdMutex<Vec<ActuatorCommand>>,
    failures: StdMutex<[usize; 2]>,
    latency: Option<Duration>,
    in_flight: [AtomicUsize; 2],
    max_in_flight: [AtomicUsize; 2],
}

impl Default for RecordingActuatorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingActuatorSink {
    pub fn new() -> Self {
        Self {
            log: StdMutex::new(Vec::new()),
            failures: StdMutex::new([0; 2]),
            latency: None,
            in_flight: [AtomicUsize::new(0), AtomicUsize::new(0)],
            max_in_flight: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` writes to `actuator` fail.
    pub fn fail_next(&self, actuator: Actuator, count: usize) {
        if let Ok(mut f) = self.failures.lock() {
            f[actuator.index()] = count;
        }
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn commands_for(&self, actuator: Actuator) -> Vec<ActuatorCommand> {
        self.commands()
            .into_iter()
            .filter(|c| c.actuator == actuator)
            .collect()
    }

    pub fn max_in_flight(&self, actuator: Actuator) -> usize {
        self.max_in_flight[actuator.index()].load(Ordering::SeqCst)
    }

    fn take_failure(&self, actuator: Actuator) -> bool {
        let Ok(mut f) = self.failures.lock() else { return false; };
        let slot = &mut f[actuator.index()];
        if *slot > 0 {
            *slot -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl ActuatorSink for RecordingActuatorSink {
    async fn apply(&self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        let idx = command.actuator.index();
        let now = self.in_flight[idx].fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight[idx].fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = if self.take_failure(command.actuator) {
            Err(ActuatorError::Unavailable(format!("injected failure for {command}")))
        } else {
            if let Ok(mut log) = self.log.lock() {
                log.push(command);
            }
            Ok(())
        };

        self.in_flight[idx].fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Writes alerts to the log.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, alert: &Alert) {
        tracing::warn!(
            profile = %alert.profile_id,
            kind = ?alert.kind,
            title = %alert.title,
            "{}",
            alert.message
        );
    }
}

#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: StdMutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, alert: &Alert) {
        if let Ok(mut a) = self.alerts.lock() {
            a.push(alert.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planter_types::{AlertMessages, CareProfile, ProfileKind};

    fn profile(id: &str, kind: ProfileKind) -> PlantProfile {
        PlantProfile {
            id: ProfileId::from(id),
            kind,
            name: "Basil".into(),
            care: CareProfile {
                moisture_percent: 40,
                min_temp: 15,
                max_temp: 30,
                watering_frequency: "weekly".into(),
                watering_description: "keep moist".into(),
            },
            image: None,
            messages: AlertMessages::default(),
        }
    }

    #[tokio::test]
    async fn list_puts_real_profile_first() {
        let store = InMemoryProfileStore::new();
        store.put(profile("sim-a", ProfileKind::Sim)).await.unwrap();
        store.put(profile("real-planter-card", ProfileKind::Real)).await.unwrap();
        store.put(profile("sim-b", ProfileKind::Sim)).await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec!["real-planter-card", "sim-a", "sim-b"]);

        assert!(store.remove(&ProfileId::from("sim-a")).await.unwrap());
        assert!(!store.remove(&ProfileId::from("sim-a")).await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_are_not_recorded() {
        let sink = RecordingActuatorSink::new();
        sink.fail_next(Actuator::Pump, 1);

        assert!(sink.apply(ActuatorCommand::on(Actuator::Pump)).await.is_err());
        assert!(sink.apply(ActuatorCommand::on(Actuator::Fan)).await.is_ok());
        assert!(sink.apply(ActuatorCommand::on(Actuator::Pump)).await.is_ok());

        assert_eq!(
            sink.commands(),
            vec![ActuatorCommand::on(Actuator::Fan), ActuatorCommand::on(Actuator::Pump)]
        );
    }
}
