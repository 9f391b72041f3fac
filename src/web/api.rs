//! Defines the Axum API routes and handlers.

use crate::controller::ControlError;
use crate::device::DeviceError;
use crate::notify::Notifier;
use crate::production::ManualRunConfig;
use crate::schedule::JobId;
use crate::web::control_channel::{call, ControlRequest};
use crate::web::models::NewScheduleRequest;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use futures_core::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc::Sender;

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ControlError::Device(DeviceError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ControlError::Device(_) => StatusCode::BAD_GATEWAY,
            ControlError::UnknownJob(_) => StatusCode::NOT_FOUND,
            ControlError::ConnectInProgress | ControlError::ConnectCancelled => StatusCode::CONFLICT,
            ControlError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        json_error(&self.to_string(), status)
    }
}

/// Unwrap a JSON body, answering malformed input with the usual `{"error": ..}` shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            tracing::debug!("Rejected request body: {}", rejection.body_text());
            Err(json_error(&rejection.body_text(), rejection.status()))
        }
    }
}

pub struct AppStateInner {
    pub control_tx: Sender<ControlRequest>,
    pub notifier: Notifier,
    /// Fired when the server starts shutting down; ends open event streams.
    pub shutdown: broadcast::Sender<()>,
}
pub type AppState = Arc<AppStateInner>;

/// Creates the Axum router with all the API endpoints.
pub fn create_router(
    control_tx: Sender<ControlRequest>,
    notifier: Notifier,
    shutdown: broadcast::Sender<()>,
) -> Router {
    let state = Arc::new(AppStateInner { control_tx, notifier, shutdown });
    Router::new()
        .route("/api/v1/schedules", get(list_schedules).post(add_schedule))
        .route("/api/v1/schedules/{id}", delete(delete_schedule))
        .route("/api/v1/schedules/{id}/toggle", post(toggle_schedule))
        .route("/api/v1/schedules/{id}/dispatch", post(dispatch_schedule))
        .route("/api/v1/run", get(get_run))
        .route("/api/v1/run/start", post(start_run))
        .route("/api/v1/run/stop", post(stop_run))
        .route("/api/v1/run/settings", post(send_settings))
        .route("/api/v1/device", get(get_device))
        .route("/api/v1/device/connect", post(connect_device))
        .route("/api/v1/device/disconnect", post(disconnect_device))
        .route("/api/v1/device/emergency-stop", post(emergency_stop))
        .route("/api/v1/notifications", get(notification_stream))
        .with_state(state)
}

/// GET /api/v1/schedules
async fn list_schedules(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::ListSchedules { respond_to }).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/schedules
async fn add_schedule(
    State(state): State<AppState>,
    payload: Result<Json<NewScheduleRequest>, JsonRejection>,
) -> Response {
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match call(&state.control_tx, |respond_to| ControlRequest::AddSchedule { request, respond_to }).await {
        Ok(Ok(job)) => (StatusCode::CREATED, Json(job)).into_response(),
        Ok(Err(e)) | Err(e) => e.into_response(),
    }
}

/// POST /api/v1/schedules/{id}/toggle -- 204 when the id is unknown
async fn toggle_schedule(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::ToggleSchedule { id, respond_to }).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /api/v1/schedules/{id}
async fn delete_schedule(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::DeleteSchedule { id, respond_to }).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/schedules/{id}/dispatch
async fn dispatch_schedule(State(state): State<AppState>, Path(id): Path<JobId>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::DispatchSchedule { id, respond_to }).await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(e)) | Err(e) => e.into_response(),
    }
}

/// GET /api/v1/run
async fn get_run(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::GetRun { respond_to }).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/run/start
async fn start_run(State(state): State<AppState>, payload: Result<Json<ManualRunConfig>, JsonRejection>) -> Response {
    let config = match json_body(payload) {
        Ok(config) => config,
        Err(response) => return response,
    };
    match call(&state.control_tx, |respond_to| ControlRequest::StartRun { config, respond_to }).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/run/stop
async fn stop_run(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::StopRun { respond_to }).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/run/settings
async fn send_settings(State(state): State<AppState>, payload: Result<Json<ManualRunConfig>, JsonRejection>) -> Response {
    let config = match json_body(payload) {
        Ok(config) => config,
        Err(response) => return response,
    };
    match call(&state.control_tx, |respond_to| ControlRequest::SendSettings { config, respond_to }).await {
        Ok(Ok(applied)) => (StatusCode::OK, Json(applied)).into_response(),
        Ok(Err(e)) | Err(e) => e.into_response(),
    }
}

/// GET /api/v1/device
async fn get_device(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::GetDevice { respond_to }).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/device/connect
async fn connect_device(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::Connect { respond_to }).await {
        Ok(Ok(snapshot)) => (StatusCode::OK, Json(snapshot)).into_response(),
        Ok(Err(e)) | Err(e) => e.into_response(),
    }
}

/// POST /api/v1/device/disconnect
async fn disconnect_device(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::Disconnect { respond_to }).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/device/emergency-stop
async fn emergency_stop(State(state): State<AppState>) -> Response {
    match call(&state.control_tx, |respond_to| ControlRequest::EmergencyStop { respond_to }).await {
        Ok(Ok(ack)) => (StatusCode::OK, Json(ack)).into_response(),
        Ok(Err(e)) | Err(e) => e.into_response(),
    }
}

/// GET /api/v1/notifications -- server-sent events, one per notification.
/// The stream ends when the server shuts down.
async fn notification_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.notifier.subscribe();
    let mut shutdown_rx = state.shutdown.subscribe();
    let stream = async_stream::stream! {
        loop {
            let received = tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("Closing notification stream for shutdown");
                    break;
                }
                received = rx.recv() => received,
            };
            match received {
                Ok(notification) => match Event::default().event("notification").json_data(&notification) {
                    Ok(event) => yield Ok(event),
                    Err(e) => tracing::warn!("Failed to encode notification: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification stream lagged, {} dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
