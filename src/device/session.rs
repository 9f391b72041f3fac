use super::{DeviceError, Telemetry};
use crate::notify::{Notification, Notifier};
use serde::Serialize;

/// Logical connection to the maker and its last-known telemetry.
///
/// Holds state only. Device I/O is performed by the controller, which feeds
/// each outcome back through the `*_succeeded` / `*_failed` methods.
#[derive(Debug)]
pub struct DeviceSession {
    connected: bool,
    telemetry: Option<Telemetry>,
    connection_attempts: u64,
    last_error: Option<DeviceError>,
    /// Bumped by every connect and disconnect. Device results tagged with an
    /// older generation belong to a superseded session and are discarded.
    generation: u64,
    notifier: Notifier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub connected: bool,
    pub telemetry: Option<Telemetry>,
    pub connection_attempts: u64,
    pub last_error: Option<String>,
}

impl DeviceSession {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            connected: false,
            telemetry: None,
            connection_attempts: 0,
            last_error: None,
            generation: 0,
            notifier,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn telemetry(&self) -> Option<&Telemetry> {
        self.telemetry.as_ref()
    }

    pub fn connection_attempts(&self) -> u64 {
        self.connection_attempts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Record a connection attempt and open a new generation for its result.
    pub fn begin_connect(&mut self) -> u64 {
        self.connection_attempts += 1;
        self.generation += 1;
        tracing::info!("Connecting to device (attempt {})", self.connection_attempts);
        self.generation
    }

    pub fn connect_succeeded(&mut self, telemetry: Telemetry) {
        self.connected = true;
        self.telemetry = Some(telemetry);
        self.last_error = None;
        self.notifier.emit(Notification::info(
            "Device Connected",
            "Successfully connected to your roti maker",
        ));
    }

    pub fn connect_failed(&mut self, error: &DeviceError) {
        self.connected = false;
        self.last_error = Some(error.clone());
        self.notifier.emit(Notification::destructive(
            "Connection Failed",
            format!("Unable to connect to the device: {}. Check your network settings.", error),
        ));
    }

    /// Drop the connection. Also invalidates any connect still in flight.
    pub fn disconnect(&mut self) {
        self.generation += 1;
        if !self.connected {
            return;
        }
        self.connected = false;
        self.notifier.emit(Notification::info(
            "Device Disconnected",
            "Telemetry polling paused",
        ));
    }

    /// Apply the result of a background telemetry poll.
    ///
    /// Results arriving after a disconnect are dropped. A failure while
    /// connected flips the session to disconnected and notifies once.
    pub fn telemetry_polled(&mut self, result: Result<Telemetry, DeviceError>) {
        if !self.connected {
            tracing::debug!("Discarding telemetry received while disconnected");
            return;
        }
        match result {
            Ok(telemetry) => {
                self.telemetry = Some(telemetry);
            }
            Err(e) => {
                self.connected = false;
                self.notifier.emit(Notification::destructive(
                    "Connection Lost",
                    format!("Device stopped responding: {}", e),
                ));
                self.last_error = Some(e);
            }
        }
    }

    pub fn emergency_stop_acknowledged(&mut self) {
        self.notifier.emit(Notification::destructive(
            "Emergency Stop",
            "Emergency stop acknowledged by the roti maker",
        ));
    }

    pub fn emergency_stop_failed(&mut self, error: &DeviceError) {
        self.last_error = Some(error.clone());
        self.notifier.emit(Notification::destructive(
            "Emergency Stop Not Acknowledged",
            format!("The device did not confirm the stop: {}. Cut power to the machine.", error),
        ));
    }

    /// Remember a failed command without changing connectivity.
    pub fn command_failed(&mut self, error: &DeviceError) {
        self.last_error = Some(error.clone());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connected: self.connected,
            telemetry: self.telemetry.clone(),
            connection_attempts: self.connection_attempts,
            last_error: self.last_error.as_ref().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StatusReport;
    use crate::notify::Severity;

    fn telemetry(temperature: f64) -> Telemetry {
        StatusReport {
            temperature,
            is_heating: false,
            jobs_remaining: 2,
            current_schedule: None,
            battery_level: Some(92.0),
        }
        .received_at(chrono::Utc::now())
    }

    #[test]
    fn test_attempts_are_monotonic() {
        let mut session = DeviceSession::new(Notifier::new());
        session.begin_connect();
        assert_eq!(session.connection_attempts(), 1);
        session.connect_failed(&DeviceError::Timeout);
        session.begin_connect();
        session.connect_succeeded(telemetry(200.0));
        assert_eq!(session.connection_attempts(), 2);
        assert!(session.is_connected());
        assert_eq!(session.snapshot().last_error, None);
    }

    #[test]
    fn test_failed_connect_is_destructive() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let mut session = DeviceSession::new(notifier);
        session.begin_connect();
        session.connect_failed(&DeviceError::Timeout);
        assert!(!session.is_connected());
        let n = rx.try_recv().unwrap();
        assert_eq!(n.title, "Connection Failed");
        assert_eq!(n.severity, Severity::Destructive);
        assert_eq!(session.snapshot().last_error.as_deref(), Some("Timeout waiting for device response"));
    }

    #[test]
    fn test_poll_failure_drops_connection_once() {
        let notifier = Notifier::new();
        let mut session = DeviceSession::new(notifier.clone());
        session.connect_succeeded(telemetry(190.0));
        let mut rx = notifier.subscribe();
        session.telemetry_polled(Err(DeviceError::Timeout));
        session.telemetry_polled(Err(DeviceError::Timeout));
        assert!(!session.is_connected());
        assert_eq!(rx.try_recv().unwrap().title, "Connection Lost");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_supersedes_pending_connect() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        let mut session = DeviceSession::new(notifier);
        let pending = session.begin_connect();
        assert!(session.is_current(pending));
        session.disconnect();
        assert!(!session.is_current(pending));
        // Nothing was connected, so nothing to announce
        assert!(rx.try_recv().is_err());
        let next = session.begin_connect();
        assert!(next > pending);
        assert!(session.is_current(next));
    }

    #[test]
    fn test_poll_ignored_while_disconnected() {
        let mut session = DeviceSession::new(Notifier::new());
        session.telemetry_polled(Ok(telemetry(210.0)));
        assert!(session.telemetry().is_none());
    }
}
