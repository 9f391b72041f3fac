//! Contains the data models for API requests and responses.

use crate::production::RunStatus;
use crate::schedule::{JobId, Thickness};
use serde::{Deserialize, Serialize};

fn default_quantity() -> u8 { 4 }
fn default_temperature() -> u16 { 200 }

/// Represents a request to add a scheduled meal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduleRequest {
    #[serde(default)]
    pub time: String,
    #[serde(default = "default_quantity")]
    pub quantity: u8,
    #[serde(default)]
    pub thickness: Thickness,
    #[serde(default = "default_temperature")]
    pub temperature: u16,
}

/// Result of sending a scheduled job to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub job_id: JobId,
    pub delivered: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRunResponse {
    /// False when a run was already in progress.
    pub started: bool,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRunResponse {
    pub stopped: bool,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyStopResponse {
    pub acknowledged: bool,
    /// Whether a local production run was cancelled.
    pub run_halted: bool,
}
