//! Defines the communication channel messages between the web server and the controller task.

use super::models::{DispatchOutcome, EmergencyStopResponse, NewScheduleRequest, StartRunResponse, StopRunResponse};
use crate::controller::ControlError;
use crate::device::SessionSnapshot;
use crate::production::{ManualRunConfig, RunStatus};
use crate::schedule::{JobId, ScheduledJob};
use tokio::sync::{mpsc, oneshot};

/// Represents a request sent from a web handler to the controller task.
#[derive(Debug)]
pub enum ControlRequest {
    ListSchedules {
        respond_to: oneshot::Sender<Vec<ScheduledJob>>,
    },
    AddSchedule {
        request: NewScheduleRequest,
        respond_to: oneshot::Sender<Result<ScheduledJob, ControlError>>,
    },
    /// `None` when the id is unknown.
    ToggleSchedule {
        id: JobId,
        respond_to: oneshot::Sender<Option<ScheduledJob>>,
    },
    DeleteSchedule {
        id: JobId,
        respond_to: oneshot::Sender<Option<ScheduledJob>>,
    },
    DispatchSchedule {
        id: JobId,
        respond_to: oneshot::Sender<Result<DispatchOutcome, ControlError>>,
    },
    GetRun {
        respond_to: oneshot::Sender<RunStatus>,
    },
    StartRun {
        config: ManualRunConfig,
        respond_to: oneshot::Sender<StartRunResponse>,
    },
    StopRun {
        respond_to: oneshot::Sender<StopRunResponse>,
    },
    /// Push manual settings to the device without starting a run.
    SendSettings {
        config: ManualRunConfig,
        respond_to: oneshot::Sender<Result<ManualRunConfig, ControlError>>,
    },
    GetDevice {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    Connect {
        respond_to: oneshot::Sender<Result<SessionSnapshot, ControlError>>,
    },
    Disconnect {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    EmergencyStop {
        respond_to: oneshot::Sender<Result<EmergencyStopResponse, ControlError>>,
    },
}

/// Send a request built by `make` and wait for the controller's reply.
pub async fn call<T>(
    control_tx: &mpsc::Sender<ControlRequest>,
    make: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
) -> Result<T, ControlError> {
    let (resp_tx, resp_rx) = oneshot::channel();
    control_tx
        .send(make(resp_tx))
        .await
        .map_err(|_| ControlError::Unavailable)?;
    resp_rx.await.map_err(|_| ControlError::Unavailable)
}
