use std::sync::Arc;
use std::time::Duration;

use planter_policy::{detect_alerts, sanitize, AlertThrottle, Decision, PolicyEvaluator};
use planter_sched::{Clock, TimerSet, TimerTicket};
use planter_store::{ActuatorError, ActuatorSink, AlertSink};
use planter_types::{
    Actuator, ActuatorCommand, ActuatorState, Alert, AlertMessages, DeviceSnapshot, Millis, ProfileId,
    SensorReading, Thresholds,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::ControllerError;

/// Actuator sink with one critical section per actuator: a second write to
/// the same actuator waits until the first one has an outcome.
pub struct GatedSink {
    inner: Arc<dyn ActuatorSink>,
    gates: [Mutex<()>; 2],
}

impl GatedSink {
    pub fn new(inner: Arc<dyn ActuatorSink>) -> Self {
        Self {
            inner,
            gates: [Mutex::new(()), Mutex::new(())],
        }
    }

    pub async fn write(&self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        let _gate = self.gates[command.actuator.index()].lock().await;
        self.inner.apply(command).await
    }
}

pub(crate) enum DeviceEvent {
    Reading(SensorReading),
    PumpStopDue(TimerTicket<Actuator>),
    Manual {
        command: ActuatorCommand,
        reply: oneshot::Sender<Result<ActuatorState, ControllerError>>,
    },
    Snapshot(oneshot::Sender<DeviceSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Everything a device reactor needs besides its own mutable state.
pub(crate) struct DeviceContext {
    pub profile_id: ProfileId,
    pub thresholds: Thresholds,
    pub messages: AlertMessages,
    pub evaluator: PolicyEvaluator,
    pub alert_cooldown_ms: Millis,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<GatedSink>,
    pub alerts: Arc<dyn AlertSink>,
}

pub(crate) struct DeviceHandle {
    pub tx: mpsc::Sender<DeviceEvent>,
    pub task: JoinHandle<()>,
}

impl DeviceHandle {
    pub fn spawn(ctx: DeviceContext, queue: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let reactor = DeviceReactor {
            throttle: AlertThrottle::new(ctx.alert_cooldown_ms),
            ctx,
            state: ActuatorState::default(),
            latest: SensorReading::default(),
            timers: TimerSet::new(),
            self_tx: tx.downgrade(),
        };
        let task = tokio::spawn(reactor.run(rx));
        Self { tx, task }
    }

    /// Ask the reactor to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(DeviceEvent::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
        let _ = self.task.await;
    }
}

/// Single-task owner of one device's actuator state. Events are handled
/// strictly one at a time in arrival order.
struct DeviceReactor {
    ctx: DeviceContext,
    state: ActuatorState,
    latest: SensorReading,
    throttle: AlertThrottle,
    timers: TimerSet<Actuator>,
    self_tx: mpsc::WeakSender<DeviceEvent>,
}

impl DeviceReactor {
    async fn run(mut self, mut rx: mpsc::Receiver<DeviceEvent>) {
        tracing::info!(profile = %self.ctx.profile_id, "device reactor started");
        while let Some(event) = rx.recv().await {
            match event {
                DeviceEvent::Reading(reading) => self.on_reading(reading).await,
                DeviceEvent::PumpStopDue(ticket) => self.on_pump_stop_due(ticket).await,
                DeviceEvent::Manual { command, reply } => {
                    let result = self.on_manual(command).await;
                    let _ = reply.send(result);
                }
                DeviceEvent::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                DeviceEvent::Shutdown(done) => {
                    self.stop().await;
                    let _ = done.send(());
                    return;
                }
            }
        }
        self.stop().await;
    }

    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            latest: self.latest,
            actuators: self.state,
            pump_stop_pending: self.timers.is_pending(&Actuator::Pump),
        }
    }

    async fn on_reading(&mut self, reading: SensorReading) {
        let reading = sanitize(&reading);
        if reading.is_empty() {
            tracing::debug!(profile = %self.ctx.profile_id, "empty reading ignored");
            return;
        }
        let now = self.ctx.clock.now_ms();
        self.latest.merge(&reading);
        self.raise_alerts(&reading, now).await;

        let decision = self
            .ctx
            .evaluator
            .evaluate(&reading, &self.ctx.thresholds, &self.state, now);
        if !decision.is_noop() {
            self.apply(decision).await;
        }
    }

    async fn raise_alerts(&mut self, reading: &SensorReading, now: Millis) {
        for kind in detect_alerts(reading, &self.ctx.thresholds) {
            if !self.throttle.admit(kind, now) {
                continue;
            }
            let alert = Alert {
                profile_id: self.ctx.profile_id.clone(),
                kind,
                title: kind.title().into(),
                message: self.ctx.messages.for_kind(kind).to_string(),
                at: now,
            };
            self.ctx.alerts.notify(&alert).await;
        }
    }

    async fn write(&self, command: Option<ActuatorCommand>) -> Option<Result<(), ActuatorError>> {
        match command {
            Some(c) => Some(self.ctx.sink.write(c).await),
            None => None,
        }
    }

    /// Write the decided commands (pump and fan independently) and commit
    /// only the parts whose write was confirmed.
    async fn apply(&mut self, decision: Decision) -> [Option<Result<(), ActuatorError>>; 2] {
        let (pump, fan) = tokio::join!(self.write(decision.pump), self.write(decision.fan));

        if let (Some(cmd), Some(result)) = (decision.pump, &pump) {
            match result {
                Ok(()) => {
                    self.state.pump_on = decision.next_state.pump_on;
                    self.state.last_watering_start = decision.next_state.last_watering_start;
                    tracing::info!(profile = %self.ctx.profile_id, command = %cmd, "pump switched");
                    match decision.pump_off_after {
                        Some(delay) if cmd.on => self.schedule_pump_stop(delay),
                        _ => {
                            self.timers.cancel(&Actuator::Pump);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(profile = %self.ctx.profile_id, command = %cmd, error = %e, "pump write failed");
                }
            }
        }

        if let (Some(cmd), Some(result)) = (decision.fan, &fan) {
            match result {
                Ok(()) => {
                    self.state.fan_on = decision.next_state.fan_on;
                    tracing::info!(profile = %self.ctx.profile_id, command = %cmd, "fan switched");
                }
                Err(e) => {
                    tracing::warn!(profile = %self.ctx.profile_id, command = %cmd, error = %e, "fan write failed");
                }
            }
        }

        [pump, fan]
    }

    fn schedule_pump_stop(&mut self, delay: Duration) {
        let Some(tx) = self.self_tx.upgrade() else { return; };
        self.timers
            .schedule(Actuator::Pump, delay, tx, DeviceEvent::PumpStopDue);
    }

    async fn on_pump_stop_due(&mut self, ticket: TimerTicket<Actuator>) {
        if !self.timers.fire(&ticket) {
            tracing::debug!(profile = %self.ctx.profile_id, "stale pump stop ignored");
            return;
        }
        if !self.state.pump_on {
            return;
        }
        let off = ActuatorCommand::off(Actuator::Pump);
        match self.ctx.sink.write(off).await {
            Ok(()) => {
                self.state.pump_on = false;
                tracing::info!(profile = %self.ctx.profile_id, "watering finished");
            }
            // The overdue-stop rule retries on the next reading.
            Err(e) => tracing::error!(profile = %self.ctx.profile_id, error = %e, "pump stop failed"),
        }
    }

    async fn on_manual(&mut self, command: ActuatorCommand) -> Result<ActuatorState, ControllerError> {
        let now = self.ctx.clock.now_ms();
        let decision = self
            .ctx
            .evaluator
            .manual(command, &self.state, now)
            .map_err(|refused| ControllerError::CoolingDown {
                remaining_ms: refused.remaining_ms,
            })?;
        if decision.is_noop() {
            return Ok(self.state);
        }
        let [pump, fan] = self.apply(decision).await;
        match pump.or(fan) {
            Some(Err(e)) => Err(e.into()),
            _ => Ok(self.state),
        }
    }

    /// Cancel pending timers; a running pump is switched off before exit.
    async fn stop(&mut self) {
        self.timers.cancel_all();
        if self.state.pump_on {
            match self.ctx.sink.write(ActuatorCommand::off(Actuator::Pump)).await {
                Ok(()) => self.state.pump_on = false,
                Err(e) => tracing::error!(profile = %self.ctx.profile_id, error = %e, "pump stop on shutdown failed"),
            }
        }
        tracing::info!(profile = %self.ctx.profile_id, "device reactor stopped");
    }
}
