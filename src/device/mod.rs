//! Device boundary: wire models, errors, and the traits the controller talks through.
//!
//! The maker's controller board exposes a small HTTP API:
//!
//! | Method | Path        | Body                      |
//! |--------|-------------|---------------------------|
//! | GET    | `/status`   | -> [`StatusReport`]       |
//! | POST   | `/schedule` | <- [`ScheduleRequest`]    |
//! | POST   | `/settings` | <- `ManualRunConfig`      |
//! | POST   | `/stop`     | -> [`StopAck`]            |

pub mod http;
pub mod models;
pub mod scripted;
pub mod session;

use crate::production::ManualRunConfig;
use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpDeviceClient;
pub use models::{ScheduleRequest, StatusReport, StopAck, Telemetry};
pub use scripted::ScriptedDevice;
pub use session::{DeviceSession, SessionSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Timeout waiting for device response")]
    Timeout,
    #[error("Device unreachable: {0}")]
    Unreachable(String),
    #[error("Device rejected request with status {status}")]
    Rejected { status: u16 },
    #[error("Malformed device response: {0}")]
    Malformed(String),
    #[error("Device did not acknowledge the command")]
    NotAcknowledged,
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
}

impl DeviceError {
    /// Whether repeating the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Timeout | DeviceError::Unreachable(_) | DeviceError::NotAcknowledged => true,
            DeviceError::Rejected { status } => *status >= 500,
            DeviceError::Malformed(_) | DeviceError::InvalidAddress(_) => false,
        }
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeviceError::Timeout
        } else if let Some(status) = e.status() {
            DeviceError::Rejected { status: status.as_u16() }
        } else if e.is_decode() {
            DeviceError::Malformed(e.to_string())
        } else {
            DeviceError::Unreachable(e.to_string())
        }
    }
}

/// Source of device telemetry snapshots.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn poll(&self) -> Result<Telemetry, DeviceError>;
}

/// Commands the host can issue to the device.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn send_schedule(&self, request: &ScheduleRequest) -> Result<(), DeviceError>;
    async fn send_settings(&self, settings: &ManualRunConfig) -> Result<(), DeviceError>;
    /// Must only return `Ok` once the device has acknowledged the stop.
    async fn emergency_stop(&self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DeviceError::Timeout.is_transient());
        assert!(DeviceError::Unreachable("refused".into()).is_transient());
        assert!(DeviceError::Rejected { status: 503 }.is_transient());
        assert!(!DeviceError::Rejected { status: 400 }.is_transient());
        assert!(!DeviceError::Malformed("eof".into()).is_transient());
    }
}
