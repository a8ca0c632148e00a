use std::sync::Arc;
use std::time::Duration;

use planter_core::{ControllerError, ControllerSettings, PlanterController};
use planter_sched::TokioClock;
use planter_store::{
    ChannelSensorSource, InMemoryProfileStore, ProfileStore, RecordingActuatorSink, RecordingAlertSink,
};
use planter_types::{
    Actuator, ActuatorCommand, AlertKind, AlertMessages, CareProfile, PlantProfile, ProfileId, ProfileKind,
    SensorReading,
};

struct Rig {
    controller: PlanterController,
    sink: Arc<RecordingActuatorSink>,
    alerts: Arc<RecordingAlertSink>,
    store: Arc<InMemoryProfileStore>,
}

fn rig() -> Rig {
    rig_with_store(InMemoryProfileStore::new())
}

fn rig_with_store(store: InMemoryProfileStore) -> Rig {
    let sink = Arc::new(RecordingActuatorSink::new());
    let alerts = Arc::new(RecordingAlertSink::new());
    let store = Arc::new(store);
    let controller = PlanterController::new(
        store.clone(),
        sink.clone(),
        alerts.clone(),
        Arc::new(TokioClock::new()),
        ControllerSettings::default(),
    );
    Rig {
        controller,
        sink,
        alerts,
        store,
    }
}

fn profile(kind: ProfileKind, moisture: i32, max_temp: i32) -> PlantProfile {
    PlantProfile {
        id: ProfileId::for_kind(kind),
        kind,
        name: "Basil".into(),
        care: CareProfile {
            moisture_percent: moisture,
            min_temp: 15,
            max_temp,
            watering_frequency: "weekly".into(),
            watering_description: "keep moist".into(),
        },
        image: None,
        messages: AlertMessages::default(),
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn watering_cycle_respects_duration_and_cooldown() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.controller.ingest(&id, SensorReading::soil(20.0)).await.unwrap();
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(snap.actuators.pump_on);
    assert_eq!(snap.actuators.last_watering_start, Some(0));
    assert!(snap.pump_stop_pending);

    sleep_ms(60_000).await;
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(!snap.actuators.pump_on, "pump stops after the watering duration");
    assert!(!snap.pump_stop_pending);

    rig.controller.ingest(&id, SensorReading::soil(15.0)).await.unwrap();
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(!snap.actuators.pump_on, "cooldown suppresses a second watering");

    sleep_ms(240_001).await;
    rig.controller.ingest(&id, SensorReading::soil(15.0)).await.unwrap();
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(snap.actuators.pump_on);
    assert_eq!(snap.actuators.last_watering_start, Some(300_001));

    assert_eq!(
        rig.sink.commands_for(Actuator::Pump),
        vec![
            ActuatorCommand::on(Actuator::Pump),
            ActuatorCommand::off(Actuator::Pump),
            ActuatorCommand::on(Actuator::Pump),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn pump_stops_exactly_after_watering_duration() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.controller.ingest(&id, SensorReading::soil(5.0)).await.unwrap();
    sleep_ms(9_999).await;
    assert!(rig.controller.snapshot(&id).await.unwrap().actuators.pump_on);
    sleep_ms(2).await;
    assert!(!rig.controller.snapshot(&id).await.unwrap().actuators.pump_on);
}

#[tokio::test(start_paused = true)]
async fn fan_follows_temperature_transitions() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    for temp in [32.0, 31.0, 29.0] {
        rig.controller.ingest(&id, SensorReading::temperature(temp)).await.unwrap();
    }
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(!snap.actuators.fan_on);
    assert_eq!(
        rig.sink.commands_for(Actuator::Fan),
        vec![ActuatorCommand::on(Actuator::Fan), ActuatorCommand::off(Actuator::Fan)]
    );
    assert!(rig.sink.commands_for(Actuator::Pump).is_empty());
}

#[tokio::test(start_paused = true)]
async fn temperature_only_reading_makes_no_pump_decision() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.controller.ingest(&id, SensorReading::soil(50.0)).await.unwrap();
    rig.controller.ingest(&id, SensorReading::temperature(35.0)).await.unwrap();
    let snap = rig.controller.snapshot(&id).await.unwrap();

    assert!(snap.actuators.fan_on);
    assert_eq!(snap.actuators.last_watering_start, None);
    assert_eq!(snap.latest.soil_moisture_percent, Some(50.0));
    assert_eq!(snap.latest.temperature_celsius, Some(35.0));
}

#[tokio::test(start_paused = true)]
async fn failed_pump_write_is_not_committed_and_retried_on_next_reading() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.sink.fail_next(Actuator::Pump, 1);
    rig.controller.ingest(&id, SensorReading::soil(10.0)).await.unwrap();
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(!snap.actuators.pump_on);
    assert_eq!(snap.actuators.last_watering_start, None);
    assert!(!snap.pump_stop_pending);

    sleep_ms(1_000).await;
    rig.controller.ingest(&id, SensorReading::soil(10.0)).await.unwrap();
    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert!(snap.actuators.pump_on);
    assert_eq!(snap.actuators.last_watering_start, Some(1_000));
}

#[tokio::test(start_paused = true)]
async fn lost_pump_stop_is_recovered_by_next_reading() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.controller.ingest(&id, SensorReading::soil(10.0)).await.unwrap();
    rig.controller.snapshot(&id).await.unwrap();
    rig.sink.fail_next(Actuator::Pump, 1);

    sleep_ms(10_001).await;
    assert!(rig.controller.snapshot(&id).await.unwrap().actuators.pump_on);

    rig.controller.ingest(&id, SensorReading::temperature(20.0)).await.unwrap();
    assert!(!rig.controller.snapshot(&id).await.unwrap().actuators.pump_on);
    assert_eq!(
        rig.sink.commands_for(Actuator::Pump),
        vec![ActuatorCommand::on(Actuator::Pump), ActuatorCommand::off(Actuator::Pump)]
    );
}

#[tokio::test(start_paused = true)]
async fn deleting_profile_cancels_pending_stop_and_parks_pump() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.controller.ingest(&id, SensorReading::soil(10.0)).await.unwrap();
    assert!(rig.controller.snapshot(&id).await.unwrap().pump_stop_pending);

    rig.controller.delete_profile(&id).await.unwrap();
    sleep_ms(30_000).await;

    assert_eq!(
        rig.sink.commands_for(Actuator::Pump),
        vec![ActuatorCommand::on(Actuator::Pump), ActuatorCommand::off(Actuator::Pump)]
    );
    assert!(matches!(
        rig.controller.ingest(&id, SensorReading::soil(10.0)).await,
        Err(ControllerError::NotFound(_))
    ));
    assert!(rig.store.get(&id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn old_timer_never_fires_against_replacement_profile() {
    let rig = rig();
    let first = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap();
    rig.controller.ingest(&first.id, SensorReading::soil(10.0)).await.unwrap();
    rig.controller.snapshot(&first.id).await.unwrap();

    let mut second = profile(ProfileKind::Real, 20, 28);
    second.name = "Mint".into();
    let second = rig.controller.create_profile(second, true).await.unwrap();
    rig.controller.manual(&second.id, Actuator::Fan, true).await.unwrap();

    sleep_ms(20_000).await;
    let snap = rig.controller.snapshot(&second.id).await.unwrap();
    assert!(!snap.actuators.pump_on);
    assert!(snap.actuators.fan_on);
    assert_eq!(
        rig.sink.commands_for(Actuator::Pump),
        vec![ActuatorCommand::on(Actuator::Pump), ActuatorCommand::off(Actuator::Pump)]
    );
    assert_eq!(rig.controller.get_profile(&second.id).await.unwrap().name, "Mint");
}

#[tokio::test(start_paused = true)]
async fn second_real_profile_requires_replace() {
    let rig = rig();
    rig.controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap();
    let err = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 40, 30), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Conflict(_)));

    rig.controller
        .create_profile(profile(ProfileKind::Sim, 40, 30), false)
        .await
        .unwrap();
    assert_eq!(rig.controller.list_profiles().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_real_profile_creates_admit_only_one() {
    let rig = rig_with_store(InMemoryProfileStore::new().with_latency(Duration::from_millis(50)));
    let (first, second) = tokio::join!(
        rig.controller
            .create_profile(profile(ProfileKind::Real, 30, 30), false),
        rig.controller
            .create_profile(profile(ProfileKind::Real, 40, 30), false),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    let err = first.err().or(second.err()).unwrap();
    assert!(matches!(err, ControllerError::Conflict(_)));

    let stored = rig.store.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    rig.controller
        .ingest(&ProfileId::real(), SensorReading::soil(10.0))
        .await
        .unwrap();
    assert!(rig.controller.snapshot(&ProfileId::real()).await.unwrap().actuators.pump_on);
}

#[tokio::test(start_paused = true)]
async fn alerts_are_throttled_per_kind() {
    let rig = rig();
    let mut p = profile(ProfileKind::Real, 30, 30);
    p.messages.water = "Fill the tank".into();
    let id = rig.controller.create_profile(p, false).await.unwrap().id;

    rig.controller.ingest(&id, SensorReading::soil(20.0)).await.unwrap();
    sleep_ms(5_000).await;
    rig.controller.ingest(&id, SensorReading::soil(20.0)).await.unwrap();
    let low_tank = SensorReading {
        water_level_percent: Some(1.0),
        ..Default::default()
    };
    rig.controller.ingest(&id, low_tank).await.unwrap();
    sleep_ms(5_000).await;
    rig.controller.ingest(&id, SensorReading::soil(20.0)).await.unwrap();
    rig.controller.snapshot(&id).await.unwrap();

    let kinds: Vec<AlertKind> = rig.alerts.alerts().iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![AlertKind::DrySoil, AlertKind::WaterTankEmpty, AlertKind::DrySoil]
    );
    assert_eq!(rig.alerts.alerts()[1].message, "Fill the tank");
}

#[tokio::test(start_paused = true)]
async fn manual_toggle_is_idempotent_and_hardware_only() {
    let rig = rig();
    let real = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap();
    let sim = rig
        .controller
        .create_profile(profile(ProfileKind::Sim, 30, 30), false)
        .await
        .unwrap();

    let state = rig.controller.manual(&real.id, Actuator::Fan, true).await.unwrap();
    assert!(state.fan_on);
    rig.controller.manual(&real.id, Actuator::Fan, true).await.unwrap();
    assert_eq!(rig.sink.commands_for(Actuator::Fan).len(), 1);

    let state = rig.controller.manual(&real.id, Actuator::Pump, true).await.unwrap();
    assert!(state.pump_on);
    sleep_ms(10_001).await;
    assert!(!rig.controller.snapshot(&real.id).await.unwrap().actuators.pump_on);

    assert!(matches!(
        rig.controller.manual(&sim.id, Actuator::Fan, true).await,
        Err(ControllerError::NotHardware(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn manual_pump_start_waits_out_watering_cooldown() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;

    rig.controller.ingest(&id, SensorReading::soil(10.0)).await.unwrap();
    sleep_ms(20_000).await;
    assert!(matches!(
        rig.controller.manual(&id, Actuator::Pump, true).await,
        Err(ControllerError::CoolingDown { .. })
    ));
    assert_eq!(rig.sink.commands_for(Actuator::Pump), vec![
        ActuatorCommand::on(Actuator::Pump),
        ActuatorCommand::off(Actuator::Pump),
    ]);

    sleep_ms(281_000).await;
    let state = rig.controller.manual(&id, Actuator::Pump, true).await.unwrap();
    assert!(state.pump_on);
}

#[tokio::test(start_paused = true)]
async fn attached_source_feeds_device_in_order() {
    let rig = rig();
    let id = rig
        .controller
        .create_profile(profile(ProfileKind::Real, 30, 30), false)
        .await
        .unwrap()
        .id;
    let (tx, source) = ChannelSensorSource::new(8);
    rig.controller.attach_source(&id, Arc::new(source)).await.unwrap();

    tx.send(SensorReading::temperature(33.0)).await.unwrap();
    tx.send(SensorReading::temperature(25.0)).await.unwrap();
    sleep_ms(10).await;

    let snap = rig.controller.snapshot(&id).await.unwrap();
    assert_eq!(snap.latest.temperature_celsius, Some(25.0));
    assert!(!snap.actuators.fan_on);
    assert_eq!(
        rig.sink.commands_for(Actuator::Fan),
        vec![ActuatorCommand::on(Actuator::Fan), ActuatorCommand::off(Actuator::Fan)]
    );
}

#[tokio::test(start_paused = true)]
async fn restore_starts_stored_hardware_profile() {
    let rig = rig();
    rig.store.put(profile(ProfileKind::Real, 30, 30)).await.unwrap();
    rig.store.put(profile(ProfileKind::Sim, 30, 30)).await.unwrap();

    assert_eq!(rig.controller.restore().await.unwrap(), 1);
    rig.controller
        .ingest(&ProfileId::real(), SensorReading::soil(10.0))
        .await
        .unwrap();
    assert!(rig.controller.snapshot(&ProfileId::real()).await.unwrap().actuators.pump_on);
}

#[tokio::test(start_paused = true)]
async fn invalid_profiles_are_rejected() {
    let rig = rig();
    let mut p = profile(ProfileKind::Real, 30, 30);
    p.id = ProfileId::from("my-planter");
    assert!(matches!(
        rig.controller.create_profile(p, false).await,
        Err(ControllerError::Validation(_))
    ));

    let mut p = profile(ProfileKind::Sim, 30, 30);
    p.care.min_temp = 35;
    assert!(matches!(
        rig.controller.create_profile(p, false).await,
        Err(ControllerError::Validation(_))
    ));
}
