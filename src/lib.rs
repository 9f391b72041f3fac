// roti_host: host-side controller for an automated flatbread maker

pub mod config;
pub mod controller;
pub mod device;
pub mod notify;
pub mod production;
pub mod schedule;
pub mod sim;
pub mod web;

pub use controller::{Controller, ControllerHandle};
pub use device::{DeviceClient, DeviceError, DeviceSession, Telemetry, TelemetrySource};
pub use notify::{Notification, Notifier, Severity};
pub use production::{ManualRunConfig, OilLevel, ProductionRun, RunStatus};
pub use schedule::{JobId, ScheduleManager, ScheduledJob, Thickness, ValidationError};
