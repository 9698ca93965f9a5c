//! Scheduling strategies governing automatic tint activation.
//!
//! `ScheduleMode` is a closed sum over the two automatic strategies: the
//! user-configured daily window (`CustomSchedule`) and the sunrise/sunset
//! signal (`TwilightSchedule`). The coordinator owns exactly one live mode
//! per session; a mode is stopped, synchronously releasing its alarm or
//! listener subscription, before a replacement starts.

pub mod custom;
pub mod twilight;

use chrono::DateTime;
use chrono_tz::Tz;

pub use custom::CustomSchedule;
pub use twilight::TwilightSchedule;

/// Lifecycle of a schedule mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Running,
}

/// The active scheduling strategy.
pub enum ScheduleMode {
    Custom(CustomSchedule),
    Twilight(TwilightSchedule),
}

impl ScheduleMode {
    /// Stop the mode, releasing all its triggers. Safe to call twice.
    pub fn stop(&mut self) {
        match self {
            ScheduleMode::Custom(custom) => custom.stop(),
            ScheduleMode::Twilight(twilight) => twilight.stop(),
        }
    }

    /// Notification that an activation change was actually applied.
    pub fn on_activated(&mut self, active: bool, at: DateTime<Tz>) {
        match self {
            ScheduleMode::Custom(custom) => custom.on_activated(active, at),
            // The twilight strategy keeps no transition stamp.
            ScheduleMode::Twilight(_) => {}
        }
    }

    pub fn as_custom_mut(&mut self) -> Option<&mut CustomSchedule> {
        match self {
            ScheduleMode::Custom(custom) => Some(custom),
            _ => None,
        }
    }

    pub fn as_twilight_mut(&mut self) -> Option<&mut TwilightSchedule> {
        match self {
            ScheduleMode::Twilight(twilight) => Some(twilight),
            _ => None,
        }
    }
}
