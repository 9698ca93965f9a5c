//! Display tint actuation.
//!
//! The coordinator drives the display through the `TintBackend` trait: apply
//! the night preset or the day preset, fire-and-forget. A failed write is
//! logged by the caller and never retried; the scheduler must keep running
//! regardless of whether the panel accepted the preset.

pub mod sysfs;

use anyhow::Result;

pub use sysfs::SysfsBackend;

/// Applies tint presets to the display.
pub trait TintBackend: Send {
    /// Name for log output.
    fn name(&self) -> &'static str;

    /// Apply the warm night preset.
    fn apply_night_preset(&mut self) -> Result<()>;

    /// Restore the neutral day preset.
    fn apply_day_preset(&mut self) -> Result<()>;
}

/// Backend that records preset applications, for tests.
///
/// Clones share the same log, so a test can keep one handle while the
/// coordinator owns the other.
#[cfg(any(test, feature = "testing-support"))]
#[derive(Default, Clone)]
pub struct RecordingBackend {
    applied: std::sync::Arc<std::sync::Mutex<Vec<bool>>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presets applied in order; `true` for night.
    pub fn applied(&self) -> Vec<bool> {
        self.applied.lock().unwrap().clone()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl TintBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn apply_night_preset(&mut self) -> Result<()> {
        self.applied.lock().unwrap().push(true);
        Ok(())
    }

    fn apply_day_preset(&mut self) -> Result<()> {
        self.applied.lock().unwrap().push(false);
        Ok(())
    }
}
