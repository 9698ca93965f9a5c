//! Persisted per-user settings for the tint scheduler.
//!
//! The scheduling core consumes settings through the `SettingsStore` trait;
//! the production implementation is the TOML-backed `FileSettingsStore` in
//! this module's `file` submodule, with hot-reload provided by `watcher`.
//! Values are assumed pre-validated by the store: getters are infallible and
//! fall back to defaults for missing entries.

pub mod file;
pub mod watcher;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CUSTOM_END, DEFAULT_CUSTOM_START};
use crate::window::LocalTime;

pub use file::FileSettingsStore;
pub use watcher::SettingsWatcher;

/// Identifier of a user session.
pub type UserId = u32;

/// Which scheduling strategy governs activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMode {
    /// No automatic scheduling; activation follows the persisted flag only.
    Manual,
    /// User-configured daily start/end window.
    Custom,
    /// Sunrise/sunset signal from the twilight provider.
    Twilight,
}

/// A settings entry that changed on disk. Per-user keys carry the user they
/// belong to, so a session can ignore edits to other users' tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    ActivationFlag(UserId),
    AutoMode(UserId),
    CustomStartTime(UserId),
    CustomEndTime(UserId),
    /// The daemon-level scheduling zone.
    Timezone,
}

/// Persisted settings the scheduling core reads and writes.
///
/// Change notification is delivered separately, as `SettingChanged` events on
/// the session channel.
pub trait SettingsStore: Send + Sync {
    /// The persisted activation flag (manual on/off switch).
    fn activation_flag(&self, user: UserId) -> bool;

    /// Persist a new activation flag.
    fn set_activation_flag(&self, user: UserId, active: bool) -> Result<()>;

    /// The selected auto-mode.
    fn auto_mode(&self, user: UserId) -> AutoMode;

    /// Custom window start time (tint on).
    fn custom_start_time(&self, user: UserId) -> LocalTime;

    /// Custom window end time (tint off).
    fn custom_end_time(&self, user: UserId) -> LocalTime;
}

/// Default custom window start.
pub fn default_custom_start() -> LocalTime {
    let (hour, minute) = DEFAULT_CUSTOM_START;
    LocalTime::new(hour, minute).expect("default start time is valid")
}

/// Default custom window end.
pub fn default_custom_end() -> LocalTime {
    let (hour, minute) = DEFAULT_CUSTOM_END;
    LocalTime::new(hour, minute).expect("default end time is valid")
}

/// In-memory settings store for tests.
#[cfg(any(test, feature = "testing-support"))]
pub struct MemorySettingsStore {
    inner: std::sync::Mutex<MemorySettings>,
}

#[cfg(any(test, feature = "testing-support"))]
struct MemorySettings {
    activated: bool,
    auto_mode: AutoMode,
    custom_start: LocalTime,
    custom_end: LocalTime,
    /// Activation flags written through the trait, in order.
    persisted: Vec<bool>,
}

#[cfg(any(test, feature = "testing-support"))]
impl MemorySettingsStore {
    pub fn new(auto_mode: AutoMode) -> Self {
        Self {
            inner: std::sync::Mutex::new(MemorySettings {
                activated: false,
                auto_mode,
                custom_start: default_custom_start(),
                custom_end: default_custom_end(),
                persisted: Vec::new(),
            }),
        }
    }

    pub fn set_auto_mode(&self, mode: AutoMode) {
        self.inner.lock().unwrap().auto_mode = mode;
    }

    pub fn set_custom_window(&self, start: LocalTime, end: LocalTime) {
        let mut inner = self.inner.lock().unwrap();
        inner.custom_start = start;
        inner.custom_end = end;
    }

    pub fn set_activated(&self, active: bool) {
        self.inner.lock().unwrap().activated = active;
    }

    /// Activation flags persisted through `set_activation_flag`, in order.
    pub fn persisted_flags(&self) -> Vec<bool> {
        self.inner.lock().unwrap().persisted.clone()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl SettingsStore for MemorySettingsStore {
    fn activation_flag(&self, _user: UserId) -> bool {
        self.inner.lock().unwrap().activated
    }

    fn set_activation_flag(&self, _user: UserId, active: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.activated = active;
        inner.persisted.push(active);
        Ok(())
    }

    fn auto_mode(&self, _user: UserId) -> AutoMode {
        self.inner.lock().unwrap().auto_mode
    }

    fn custom_start_time(&self, _user: UserId) -> LocalTime {
        self.inner.lock().unwrap().custom_start
    }

    fn custom_end_time(&self, _user: UserId) -> LocalTime {
        self.inner.lock().unwrap().custom_end
    }
}
