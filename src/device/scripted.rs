use super::{DeviceClient, DeviceError, ScheduleRequest, StatusReport, Telemetry, TelemetrySource};
use crate::production::ManualRunConfig;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct Script {
    readings: Vec<StatusReport>,
    cursor: usize,
    reachable: bool,
    acknowledge_stop: bool,
    latency: Duration,
    polls: u32,
    stops: u32,
    schedules: Vec<ScheduleRequest>,
    settings: Vec<ManualRunConfig>,
}

/// Deterministic in-process device.
///
/// Telemetry cycles through a fixed list of readings. Reachability and stop
/// acknowledgment can be flipped at any time, and every command received is
/// recorded for inspection.
#[derive(Debug)]
pub struct ScriptedDevice {
    script: Mutex<Script>,
}

impl ScriptedDevice {
    pub fn new(readings: Vec<StatusReport>) -> Self {
        Self {
            script: Mutex::new(Script {
                readings,
                cursor: 0,
                reachable: true,
                acknowledge_stop: true,
                latency: Duration::ZERO,
                polls: 0,
                stops: 0,
                schedules: Vec::new(),
                settings: Vec::new(),
            }),
        }
    }

    /// A device that always reports the same idle reading.
    pub fn idle() -> Self {
        Self::new(vec![StatusReport {
            temperature: 25.0,
            is_heating: false,
            jobs_remaining: 0,
            current_schedule: None,
            battery_level: Some(100.0),
        }])
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reachable(script: &Script) -> Result<(), DeviceError> {
        if script.reachable {
            Ok(())
        } else {
            Err(DeviceError::Unreachable("scripted device offline".to_string()))
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn set_acknowledge_stop(&self, acknowledge: bool) {
        self.lock().acknowledge_stop = acknowledge;
    }

    /// Delay every status poll by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn poll_count(&self) -> u32 {
        self.lock().polls
    }

    pub fn stop_count(&self) -> u32 {
        self.lock().stops
    }

    pub fn sent_schedules(&self) -> Vec<ScheduleRequest> {
        self.lock().schedules.clone()
    }

    pub fn sent_settings(&self) -> Vec<ManualRunConfig> {
        self.lock().settings.clone()
    }
}

#[async_trait]
impl TelemetrySource for ScriptedDevice {
    async fn poll(&self) -> Result<Telemetry, DeviceError> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut script = self.lock();
        script.polls += 1;
        Self::check_reachable(&script)?;
        if script.readings.is_empty() {
            return Err(DeviceError::Malformed("no scripted readings".to_string()));
        }
        let report = script.readings[script.cursor % script.readings.len()].clone();
        script.cursor += 1;
        Ok(report.received_at(chrono::Utc::now()))
    }
}

#[async_trait]
impl DeviceClient for ScriptedDevice {
    async fn send_schedule(&self, request: &ScheduleRequest) -> Result<(), DeviceError> {
        let mut script = self.lock();
        Self::check_reachable(&script)?;
        script.schedules.push(request.clone());
        Ok(())
    }

    async fn send_settings(&self, settings: &ManualRunConfig) -> Result<(), DeviceError> {
        let mut script = self.lock();
        Self::check_reachable(&script)?;
        script.settings.push(*settings);
        Ok(())
    }

    async fn emergency_stop(&self) -> Result<(), DeviceError> {
        let mut script = self.lock();
        script.stops += 1;
        Self::check_reachable(&script)?;
        if script.acknowledge_stop {
            Ok(())
        } else {
            Err(DeviceError::NotAcknowledged)
        }
    }
}
