//! Controller task: the single writer for schedule, production run and device session.
//!
//! Requests arrive over an mpsc channel with oneshot responders. Device I/O
//! runs in tasks owned by the controller and reports back as completions, so
//! state is only ever touched from the controller loop. Shutting the
//! controller down drops its timers and aborts any in-flight device call.

use crate::config::Config;
use crate::device::{DeviceClient, DeviceError, DeviceSession, ScheduleRequest, SessionSnapshot, Telemetry, TelemetrySource};
use crate::notify::{Notification, Notifier};
use crate::production::{ManualRunConfig, ProductionRun, TickOutcome};
use crate::schedule::{JobId, ScheduleManager, ValidationError};
use crate::web::control_channel::ControlRequest;
use crate::web::models::{DispatchOutcome, EmergencyStopResponse, StartRunResponse, StopRunResponse};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};

const REQUEST_CAPACITY: usize = 16;
const COMPLETION_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Unknown schedule {0}")]
    UnknownJob(JobId),
    #[error("A connection attempt is already in progress")]
    ConnectInProgress,
    #[error("Connection attempt was cancelled by a disconnect")]
    ConnectCancelled,
    #[error("Controller unavailable")]
    Unavailable,
}

/// Outcome of device I/O performed off the controller loop.
enum Completion {
    Connected {
        generation: u64,
        result: Result<Telemetry, DeviceError>,
        respond_to: oneshot::Sender<Result<SessionSnapshot, ControlError>>,
    },
    Polled {
        generation: u64,
        result: Result<Telemetry, DeviceError>,
    },
    Dispatched {
        job_id: JobId,
        request: ScheduleRequest,
        result: Result<(), DeviceError>,
        respond_to: oneshot::Sender<Result<DispatchOutcome, ControlError>>,
    },
    SettingsSent {
        config: ManualRunConfig,
        result: Result<(), DeviceError>,
        respond_to: oneshot::Sender<Result<ManualRunConfig, ControlError>>,
    },
    Stopped {
        run_halted: bool,
        result: Result<(), DeviceError>,
        respond_to: oneshot::Sender<Result<EmergencyStopResponse, ControlError>>,
    },
}

fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

pub struct Controller {
    schedule: ScheduleManager,
    run: ProductionRun,
    session: DeviceSession,
    client: Arc<dyn DeviceClient>,
    telemetry: Arc<dyn TelemetrySource>,
    notifier: Notifier,
    tick_interval: Duration,
    poll_interval: Duration,
    run_ticker: Option<Interval>,
    /// Periodic telemetry poll in flight, if any.
    poll_task: Option<AbortHandle>,
    connect_pending: bool,
    tasks: JoinSet<()>,
    done_tx: mpsc::Sender<Completion>,
    done_rx: mpsc::Receiver<Completion>,
}

/// Handle to a running controller task.
pub struct ControllerHandle {
    control_tx: mpsc::Sender<ControlRequest>,
    shutdown_tx: broadcast::Sender<()>,
    notifier: Notifier,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    pub fn sender(&self) -> mpsc::Sender<ControlRequest> {
        self.control_tx.clone()
    }

    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    /// Stop the controller loop, cancel its timers and abort pending device calls.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Controller task ended abnormally: {}", e);
        }
    }
}

impl Controller {
    pub fn new(
        config: &Config,
        client: Arc<dyn DeviceClient>,
        telemetry: Arc<dyn TelemetrySource>,
        notifier: Notifier,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel(COMPLETION_CAPACITY);
        Self {
            schedule: ScheduleManager::new(notifier.clone()),
            run: ProductionRun::new(notifier.clone()),
            session: DeviceSession::new(notifier.clone()),
            client,
            telemetry,
            notifier,
            tick_interval: config.run.tick_interval(),
            poll_interval: config.telemetry.poll_interval(),
            run_ticker: None,
            poll_task: None,
            connect_pending: false,
            tasks: JoinSet::new(),
            done_tx,
            done_rx,
        }
    }

    /// Spawn the controller loop on the current runtime.
    pub fn spawn(self) -> ControllerHandle {
        let (control_tx, control_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let notifier = self.notifier.clone();
        let task = tokio::spawn(self.run_loop(control_rx, shutdown_rx));
        ControllerHandle {
            control_tx,
            shutdown_tx,
            notifier,
            task,
        }
    }

    async fn run_loop(
        mut self,
        mut control_rx: mpsc::Receiver<ControlRequest>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        tracing::info!("Controller started");
        let mut poll_ticker = periodic(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Controller shutting down");
                    break;
                }
                request = control_rx.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        tracing::info!("All control senders dropped, controller exiting");
                        break;
                    }
                },
                Some(done) = self.done_rx.recv() => self.handle_completion(done),
                _ = next_tick(&mut self.run_ticker) => self.advance_run(),
                _ = poll_ticker.tick() => self.start_poll(),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!("Device task panicked: {}", e);
                        }
                    }
                }
            }
        }
        self.run_ticker = None;
        self.tasks.shutdown().await;
    }

    fn advance_run(&mut self) {
        match self.run.tick() {
            TickOutcome::Progress(progress) => {
                tracing::trace!(progress, "Production progress");
            }
            TickOutcome::Completed { .. } | TickOutcome::Idle => {
                self.run_ticker = None;
            }
        }
    }

    fn start_poll(&mut self) {
        // The connect poll doubles as the first reading
        if !self.session.is_connected() || self.poll_task.is_some() || self.connect_pending {
            return;
        }
        let generation = self.session.generation();
        let telemetry = self.telemetry.clone();
        let done_tx = self.done_tx.clone();
        let handle = self.tasks.spawn(async move {
            let result = telemetry.poll().await;
            let _ = done_tx.send(Completion::Polled { generation, result }).await;
        });
        self.poll_task = Some(handle);
    }

    fn cancel_poll(&mut self) {
        if let Some(handle) = self.poll_task.take() {
            tracing::debug!("Cancelling in-flight telemetry poll");
            handle.abort();
        }
    }

    fn handle_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::ListSchedules { respond_to } => {
                let _ = respond_to.send(self.schedule.jobs().to_vec());
            }
            ControlRequest::AddSchedule { request, respond_to } => {
                let result = self
                    .schedule
                    .add_job(&request.time, request.quantity, request.thickness, request.temperature)
                    .map_err(ControlError::from);
                let _ = respond_to.send(result);
            }
            ControlRequest::ToggleSchedule { id, respond_to } => {
                let _ = respond_to.send(self.schedule.toggle_active(id));
            }
            ControlRequest::DeleteSchedule { id, respond_to } => {
                let _ = respond_to.send(self.schedule.delete_job(id));
            }
            ControlRequest::DispatchSchedule { id, respond_to } => {
                let Some(request) = self.schedule.dispatch(id) else {
                    let _ = respond_to.send(Err(ControlError::UnknownJob(id)));
                    return;
                };
                let client = self.client.clone();
                let done_tx = self.done_tx.clone();
                self.tasks.spawn(async move {
                    let result = client.send_schedule(&request).await;
                    let _ = done_tx
                        .send(Completion::Dispatched { job_id: id, request, result, respond_to })
                        .await;
                });
            }
            ControlRequest::GetRun { respond_to } => {
                let _ = respond_to.send(self.run.status());
            }
            ControlRequest::StartRun { config, respond_to } => {
                let started = self.run.start(config);
                if started {
                    self.run_ticker = Some(periodic(self.tick_interval));
                }
                let _ = respond_to.send(StartRunResponse { started, status: self.run.status() });
            }
            ControlRequest::StopRun { respond_to } => {
                let stopped = self.run.stop();
                if stopped {
                    self.run_ticker = None;
                }
                let _ = respond_to.send(StopRunResponse { stopped, status: self.run.status() });
            }
            ControlRequest::SendSettings { config, respond_to } => {
                let config = config.clamped();
                let client = self.client.clone();
                let done_tx = self.done_tx.clone();
                self.tasks.spawn(async move {
                    let result = client.send_settings(&config).await;
                    let _ = done_tx
                        .send(Completion::SettingsSent { config, result, respond_to })
                        .await;
                });
            }
            ControlRequest::GetDevice { respond_to } => {
                let _ = respond_to.send(self.session.snapshot());
            }
            ControlRequest::Connect { respond_to } => {
                if self.connect_pending {
                    let _ = respond_to.send(Err(ControlError::ConnectInProgress));
                    return;
                }
                self.cancel_poll();
                self.connect_pending = true;
                let generation = self.session.begin_connect();
                let telemetry = self.telemetry.clone();
                let done_tx = self.done_tx.clone();
                self.tasks.spawn(async move {
                    let result = telemetry.poll().await;
                    let _ = done_tx
                        .send(Completion::Connected { generation, result, respond_to })
                        .await;
                });
            }
            ControlRequest::Disconnect { respond_to } => {
                self.cancel_poll();
                self.session.disconnect();
                let _ = respond_to.send(self.session.snapshot());
            }
            ControlRequest::EmergencyStop { respond_to } => {
                // Halt locally before waiting on the device
                let run_halted = self.run.stop();
                if run_halted {
                    self.run_ticker = None;
                }
                tracing::warn!(run_halted, "Emergency stop requested");
                let client = self.client.clone();
                let done_tx = self.done_tx.clone();
                self.tasks.spawn(async move {
                    let result = client.emergency_stop().await;
                    let _ = done_tx
                        .send(Completion::Stopped { run_halted, result, respond_to })
                        .await;
                });
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Connected { generation, result, respond_to } => {
                self.connect_pending = false;
                if !self.session.is_current(generation) {
                    tracing::info!("Discarding result of a cancelled connection attempt");
                    let _ = respond_to.send(Err(ControlError::ConnectCancelled));
                    return;
                }
                let reply = match result {
                    Ok(telemetry) => {
                        self.session.connect_succeeded(telemetry);
                        Ok(self.session.snapshot())
                    }
                    Err(e) => {
                        self.session.connect_failed(&e);
                        Err(ControlError::Device(e))
                    }
                };
                let _ = respond_to.send(reply);
            }
            Completion::Polled { generation, result } => {
                if !self.session.is_current(generation) {
                    tracing::debug!("Discarding telemetry from a superseded session");
                    return;
                }
                self.poll_task = None;
                self.session.telemetry_polled(result);
            }
            Completion::Dispatched { job_id, request, result, respond_to } => {
                let outcome = match result {
                    Ok(()) => DispatchOutcome { job_id, delivered: true, error: None },
                    Err(e) => {
                        self.session.command_failed(&e);
                        self.notifier.emit(Notification::destructive(
                            "Delivery Failed",
                            format!("Schedule for {} could not be delivered: {}", request.time, e),
                        ));
                        DispatchOutcome { job_id, delivered: false, error: Some(e.to_string()) }
                    }
                };
                let _ = respond_to.send(Ok(outcome));
            }
            Completion::SettingsSent { config, result, respond_to } => {
                let reply = match result {
                    Ok(()) => {
                        self.notifier.emit(Notification::info(
                            "Settings Updated",
                            "Roti preferences sent to the device",
                        ));
                        Ok(config)
                    }
                    Err(e) => {
                        self.session.command_failed(&e);
                        self.notifier.emit(Notification::destructive(
                            "Settings Not Delivered",
                            format!("Roti preferences could not be sent: {}", e),
                        ));
                        Err(ControlError::Device(e))
                    }
                };
                let _ = respond_to.send(reply);
            }
            Completion::Stopped { run_halted, result, respond_to } => {
                let reply = match result {
                    Ok(()) => {
                        self.session.emergency_stop_acknowledged();
                        Ok(EmergencyStopResponse { acknowledged: true, run_halted })
                    }
                    Err(e) => {
                        self.session.emergency_stop_failed(&e);
                        Err(ControlError::Device(e))
                    }
                };
                let _ = respond_to.send(reply);
            }
        }
    }
}
