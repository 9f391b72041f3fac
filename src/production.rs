//! Manual "make now" production run.
//!
//! `Idle -> Running -> Idle`. Progress advances by a fixed step per tick; the
//! controller owns the timer that drives [`ProductionRun::tick`].

use crate::notify::{Notification, Notifier};
use serde::{Deserialize, Serialize};

/// Progress added on every timer tick.
pub const PROGRESS_STEP: u8 = 2;
pub const QUANTITY_CHOICES: [u8; 9] = [1, 2, 3, 4, 5, 6, 8, 10, 12];

const THICKNESS_RANGE: (f32, f32) = (1.0, 8.0);
const TEMPERATURE_RANGE: (u16, u16) = (150, 250);
const COOK_TIME_RANGE: (u16, u16) = (20, 120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OilLevel {
    None,
    Light,
    Medium,
    Heavy,
}

/// Settings for a manual run. Also the `POST /settings` device payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualRunConfig {
    /// Millimetres, 0.5 mm steps.
    pub thickness: f32,
    /// °C, 5° steps.
    pub temperature: u16,
    pub quantity: u8,
    pub oil_level: OilLevel,
    /// Seconds per roti, 5 s steps.
    pub cook_time: u16,
}

impl Default for ManualRunConfig {
    fn default() -> Self {
        Self {
            thickness: 3.0,
            temperature: 200,
            quantity: 4,
            oil_level: OilLevel::Light,
            cook_time: 45,
        }
    }
}

fn snap_u16(value: u16, (min, max): (u16, u16), step: u16) -> u16 {
    let clamped = value.clamp(min, max);
    let snapped = (clamped - min + step / 2) / step * step + min;
    snapped.min(max)
}

impl ManualRunConfig {
    /// Return a copy with every value pulled into its range and onto its step.
    pub fn clamped(&self) -> Self {
        let thickness = if self.thickness.is_finite() {
            ((self.thickness.clamp(THICKNESS_RANGE.0, THICKNESS_RANGE.1)) * 2.0).round() / 2.0
        } else {
            Self::default().thickness
        };
        // Ties go to the smaller choice
        let quantity = QUANTITY_CHOICES
            .iter()
            .copied()
            .min_by_key(|q| (*q as i16 - self.quantity as i16).abs())
            .unwrap_or(QUANTITY_CHOICES[0]);
        Self {
            thickness,
            temperature: snap_u16(self.temperature, TEMPERATURE_RANGE, 5),
            quantity,
            oil_level: self.oil_level,
            cook_time: snap_u16(self.cook_time, COOK_TIME_RANGE, 5),
        }
    }
}

/// Rotis finished so far: `floor(progress/100 * quantity)`.
pub fn rotis_made(progress: u8, quantity: u8) -> u8 {
    (progress as u32 * quantity as u32 / 100) as u8
}

/// Seconds left: `ceil((100-progress)/100 * quantity * cook_time)`.
pub fn estimated_seconds_remaining(progress: u8, quantity: u8, cook_time: u16) -> u32 {
    let remaining = 100u32.saturating_sub(progress as u32);
    (remaining * quantity as u32 * cook_time as u32).div_ceil(100)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running { config: ManualRunConfig, progress: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Tick arrived while idle (e.g. a late timer).
    Idle,
    Progress(u8),
    Completed { quantity: u8 },
}

/// Snapshot of the run with its derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub running: bool,
    pub progress: u8,
    pub config: Option<ManualRunConfig>,
    pub rotis_made: Option<u8>,
    pub estimated_seconds_remaining: Option<u32>,
    pub completed_runs: u64,
}

#[derive(Debug)]
pub struct ProductionRun {
    state: RunState,
    completed_runs: u64,
    notifier: Notifier,
}

impl ProductionRun {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            state: RunState::Idle,
            completed_runs: 0,
            notifier,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    pub fn progress(&self) -> u8 {
        match self.state {
            RunState::Running { progress, .. } => progress,
            RunState::Idle => 0,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Begin a run. Returns `false` and leaves progress alone if one is already running.
    pub fn start(&mut self, config: ManualRunConfig) -> bool {
        if self.is_running() {
            tracing::debug!("Start ignored: production already running");
            return false;
        }
        let config = config.clamped();
        self.state = RunState::Running { config, progress: 0 };
        self.notifier.emit(Notification::info(
            "Starting Roti Production",
            format!("Making {} rotis at {}°C", config.quantity, config.temperature),
        ));
        true
    }

    /// Advance progress by one step, completing the run at 100.
    pub fn tick(&mut self) -> TickOutcome {
        let RunState::Running { config, progress } = &mut self.state else {
            return TickOutcome::Idle;
        };
        let next = progress.saturating_add(PROGRESS_STEP);
        if next >= 100 {
            let quantity = config.quantity;
            self.state = RunState::Idle;
            self.completed_runs += 1;
            self.notifier.emit(Notification::info(
                "Rotis Complete!",
                format!("{} fresh rotis are ready to serve", quantity),
            ));
            return TickOutcome::Completed { quantity };
        }
        *progress = next;
        TickOutcome::Progress(next)
    }

    /// Cancel the active run. Returns `false` if there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = RunState::Idle;
        self.notifier.emit(Notification::destructive(
            "Production Stopped",
            "Roti making has been halted",
        ));
        true
    }

    pub fn status(&self) -> RunStatus {
        match &self.state {
            RunState::Idle => RunStatus {
                running: false,
                progress: 0,
                config: None,
                rotis_made: None,
                estimated_seconds_remaining: None,
                completed_runs: self.completed_runs,
            },
            RunState::Running { config, progress } => RunStatus {
                running: true,
                progress: *progress,
                config: Some(*config),
                rotis_made: Some(rotis_made(*progress, config.quantity)),
                estimated_seconds_remaining: Some(estimated_seconds_remaining(
                    *progress,
                    config.quantity,
                    config.cook_time,
                )),
                completed_runs: self.completed_runs,
            },
        }
    }
}
