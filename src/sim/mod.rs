//! Simulated maker firmware.
//!
//! Serves the device HTTP API with randomised telemetry so the host can be
//! exercised without hardware. Used by the `device_sim` binary and by the
//! HTTP client tests.

use crate::device::{ScheduleRequest, StatusReport, StopAck};
use crate::production::ManualRunConfig;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Probability in [0,1] that a status request is answered with 503.
    pub drop_rate: f64,
    pub acknowledge_stop: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            drop_rate: 0.1,
            acknowledge_stop: true,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    schedules: Vec<ScheduleRequest>,
    settings: Option<ManualRunConfig>,
    stops: u32,
    halted: bool,
}

/// Shared handle onto a simulated device.
#[derive(Debug, Clone)]
pub struct SimDevice {
    options: SimOptions,
    state: Arc<Mutex<SimState>>,
}

impl SimDevice {
    pub fn new(options: SimOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schedules(&self) -> Vec<ScheduleRequest> {
        self.lock().schedules.clone()
    }

    pub fn settings(&self) -> Option<ManualRunConfig> {
        self.lock().settings
    }

    pub fn stop_count(&self) -> u32 {
        self.lock().stops
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/status", get(status))
            .route("/schedule", post(schedule))
            .route("/settings", post(settings))
            .route("/stop", post(stop))
            .with_state(self.clone())
    }
}

/// Fabricate a plausible status reading.
fn sample_status(halted: bool, queued: usize) -> StatusReport {
    let mut rng = rand::rng();
    StatusReport {
        temperature: if halted { 25.0 } else { 180.0 + rng.random::<f64>() * 40.0 },
        is_heating: !halted && rng.random_bool(0.4),
        jobs_remaining: (rng.random_range(0..8u32)).max(queued as u32),
        current_schedule: None,
        battery_level: Some(85.0 + rng.random::<f64>() * 15.0),
    }
}

async fn status(State(device): State<SimDevice>) -> Response {
    let dropped = device.options.drop_rate > 0.0
        && rand::rng().random_bool(device.options.drop_rate.min(1.0));
    if dropped {
        tracing::debug!("Simulated status drop");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let report = {
        let state = device.lock();
        let mut report = sample_status(state.halted, state.schedules.len());
        report.current_schedule = state.schedules.last().map(|s| s.time.clone());
        report
    };
    (StatusCode::OK, Json(report)).into_response()
}

async fn schedule(State(device): State<SimDevice>, Json(request): Json<ScheduleRequest>) -> StatusCode {
    tracing::info!("Sim received schedule for {} ({} rotis)", request.time, request.quantity);
    let mut state = device.lock();
    state.halted = false;
    state.schedules.push(request);
    StatusCode::ACCEPTED
}

async fn settings(State(device): State<SimDevice>, Json(config): Json<ManualRunConfig>) -> StatusCode {
    tracing::info!("Sim received settings: {:?}", config);
    device.lock().settings = Some(config);
    StatusCode::OK
}

async fn stop(State(device): State<SimDevice>) -> Json<StopAck> {
    let mut state = device.lock();
    state.stops += 1;
    state.halted = device.options.acknowledge_stop;
    tracing::warn!("Sim emergency stop #{}", state.stops);
    Json(StopAck { acknowledged: device.options.acknowledge_stop })
}
