//! Wire and host-side models for device communication.

use crate::schedule::Thickness;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `GET /status` as reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub temperature: f64,
    pub is_heating: bool,
    pub jobs_remaining: u32,
    #[serde(default)]
    pub current_schedule: Option<String>,
    #[serde(default)]
    pub battery_level: Option<f64>,
}

impl StatusReport {
    /// Stamp the report with the host receive time.
    pub fn received_at(self, last_update: DateTime<Utc>) -> Telemetry {
        Telemetry {
            temperature: self.temperature,
            is_heating: self.is_heating,
            jobs_remaining: self.jobs_remaining,
            current_schedule: self.current_schedule,
            battery_level: self.battery_level,
            last_update,
        }
    }
}

/// Last-known device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub temperature: f64,
    pub is_heating: bool,
    pub jobs_remaining: u32,
    pub current_schedule: Option<String>,
    pub battery_level: Option<f64>,
    pub last_update: DateTime<Utc>,
}

/// Body of `POST /schedule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub time: String,
    pub quantity: u8,
    pub thickness: Thickness,
    pub temperature: u16,
}

/// Body of the `POST /stop` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    pub acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_accepts_minimal_body() {
        let body = r#"{"temperature": 201.5, "isHeating": true, "jobsRemaining": 3}"#;
        let report: StatusReport = serde_json::from_str(body).unwrap();
        assert_eq!(report.jobs_remaining, 3);
        assert_eq!(report.battery_level, None);
        let at = Utc::now();
        let telemetry = report.received_at(at);
        assert_eq!(telemetry.last_update, at);
        assert!(telemetry.is_heating);
    }

    #[test]
    fn test_schedule_request_wire_shape() {
        let request = ScheduleRequest {
            time: "07:30".to_string(),
            quantity: 4,
            thickness: Thickness::Medium,
            temperature: 200,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"time": "07:30", "quantity": 4, "thickness": "medium", "temperature": 200})
        );
    }
}
