//! Meal schedule: an insertion-ordered list of timed production jobs.
//!
//! Jobs are only ever sent to the device on request; nothing here fires
//! automatically at the scheduled time of day.

use crate::device::ScheduleRequest;
use crate::notify::{Notification, Notifier};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const QUANTITY_RANGE: (u8, u8) = (1, 20);
pub const TEMPERATURE_RANGE: (u16, u16) = (150, 250);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a meal time is required")]
    MissingTime,
    #[error("invalid meal time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u16,
        max: u16,
        value: u16,
    },
}

/// Opaque job identifier. Freshly generated per job and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Thickness {
    Thin,
    #[default]
    Medium,
    Thick,
}

/// Time of day, `HH:MM`, with no date or timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MealTime(NaiveTime);

impl FromStr for MealTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::MissingTime);
        }
        NaiveTime::parse_from_str(s, "%H:%M")
            .map(MealTime)
            .map_err(|_| ValidationError::InvalidTime(s.to_string()))
    }
}

impl TryFrom<String> for MealTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MealTime> for String {
    fn from(value: MealTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for MealTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub time: MealTime,
    pub quantity: u8,
    pub thickness: Thickness,
    pub temperature: u16,
    pub active: bool,
}

impl From<&ScheduledJob> for ScheduleRequest {
    fn from(job: &ScheduledJob) -> Self {
        ScheduleRequest {
            time: job.time.to_string(),
            quantity: job.quantity,
            thickness: job.thickness,
            temperature: job.temperature,
        }
    }
}

fn check_range(field: &'static str, value: u16, (min, max): (u16, u16)) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, min, max, value });
    }
    Ok(())
}

/// Owns the ordered collection of scheduled jobs.
#[derive(Debug)]
pub struct ScheduleManager {
    jobs: Vec<ScheduledJob>,
    notifier: Notifier,
}

impl ScheduleManager {
    pub fn new(notifier: Notifier) -> Self {
        Self { jobs: Vec::new(), notifier }
    }

    /// Validate and append a new active job.
    pub fn add_job(
        &mut self,
        time: &str,
        quantity: u8,
        thickness: Thickness,
        temperature: u16,
    ) -> Result<ScheduledJob, ValidationError> {
        let validated = time.parse::<MealTime>().and_then(|time| {
            check_range("quantity", quantity as u16, (QUANTITY_RANGE.0 as u16, QUANTITY_RANGE.1 as u16))?;
            check_range("temperature", temperature, TEMPERATURE_RANGE)?;
            Ok(time)
        });
        let time = match validated {
            Ok(time) => time,
            Err(e) => {
                let notification = match &e {
                    ValidationError::MissingTime => Notification::destructive(
                        "Time Required",
                        "Please select a time for your meal schedule",
                    ),
                    other => Notification::destructive("Invalid Schedule", other.to_string()),
                };
                self.notifier.emit(notification);
                return Err(e);
            }
        };

        let job = ScheduledJob {
            id: JobId::generate(),
            time,
            quantity,
            thickness,
            temperature,
            active: true,
        };
        self.jobs.push(job.clone());
        tracing::debug!(id = %job.id, "Schedule added");
        self.notifier.emit(Notification::info(
            "Schedule Added",
            format!("Meal scheduled for {} - {} rotis", job.time, job.quantity),
        ));
        Ok(job)
    }

    /// Flip `active` on the matching job. Unknown ids are ignored.
    pub fn toggle_active(&mut self, id: JobId) -> Option<ScheduledJob> {
        let job = self.jobs.iter_mut().find(|j| j.id == id)?;
        job.active = !job.active;
        tracing::debug!(id = %id, active = job.active, "Schedule toggled");
        Some(job.clone())
    }

    /// Remove the matching job. Unknown ids are ignored.
    pub fn delete_job(&mut self, id: JobId) -> Option<ScheduledJob> {
        let pos = self.jobs.iter().position(|j| j.id == id)?;
        let removed = self.jobs.remove(pos);
        self.notifier.emit(Notification::info(
            "Schedule Deleted",
            "Meal schedule removed successfully",
        ));
        Some(removed)
    }

    /// Build the device payload for a job and announce it as sent.
    ///
    /// The announcement is unconditional; delivery failures are reported
    /// separately by whoever performs the device call.
    pub fn dispatch(&self, id: JobId) -> Option<ScheduleRequest> {
        let job = self.get(id)?;
        self.notifier.emit(Notification::info(
            "Sent to Device",
            format!("Schedule sent to device for {}", job.time),
        ));
        Some(ScheduleRequest::from(job))
    }

    pub fn get(&self, id: JobId) -> Option<&ScheduledJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
