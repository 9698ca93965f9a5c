//! Sysfs RGB tint backend.
//!
//! Writes fixed RGB gain presets to a framebuffer sysfs node. The night
//! preset pulls the white point to roughly 3400 K; the day preset restores
//! neutral gains. The node path is configurable because it varies across
//! panels.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::constants::{DAY_RGB_PRESET, NIGHT_RGB_PRESET};

use super::TintBackend;

pub struct SysfsBackend {
    path: PathBuf,
}

impl SysfsBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write_preset(&self, preset: &str) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)
            .with_context(|| format!("could not open {}", self.path.display()))?;
        file.write_all(preset.as_bytes())
            .with_context(|| format!("could not write to {}", self.path.display()))?;
        Ok(())
    }
}

impl TintBackend for SysfsBackend {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn apply_night_preset(&mut self) -> Result<()> {
        self.write_preset(NIGHT_RGB_PRESET)
    }

    fn apply_day_preset(&mut self) -> Result<()> {
        self.write_preset(DAY_RGB_PRESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_presets_to_the_node() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("rgb");
        let mut backend = SysfsBackend::new(node.clone());

        backend.apply_night_preset().unwrap();
        assert_eq!(std::fs::read_to_string(&node).unwrap(), NIGHT_RGB_PRESET);

        backend.apply_day_preset().unwrap();
        assert_eq!(std::fs::read_to_string(&node).unwrap(), DAY_RGB_PRESET);
    }

    #[test]
    fn missing_node_reports_an_error() {
        let mut backend = SysfsBackend::new(PathBuf::from("/nonexistent/dir/rgb"));
        assert!(backend.apply_night_preset().is_err());
    }
}
