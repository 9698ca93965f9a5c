//! TOML-backed settings store.
//!
//! Settings live in `~/.config/duskr/duskr.toml` (or a custom path given on
//! the command line). The file holds one `[daemon]` table for process-level
//! configuration and one `[users.N]` table per user session. A missing file
//! is created from a commented default template on first run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{CONFIG_DIR, DEFAULT_RGB_PATH, SETTINGS_FILE};
use crate::settings::{
    default_custom_end, default_custom_start, AutoMode, SettingKey, SettingsStore, UserId,
};
use crate::window::LocalTime;

/// Process-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DaemonSettings {
    /// IANA zone name for the scheduling clock; `TZ`/UTC when unset.
    pub timezone: Option<String>,
    /// Coordinates for the solar twilight provider; twilight state is
    /// absent without them.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// RGB sysfs node the tint presets are written to.
    pub rgb_path: Option<PathBuf>,
    /// User session to attach on startup.
    pub user: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserSettings {
    pub activated: Option<bool>,
    pub auto_mode: Option<AutoMode>,
    pub custom_start: Option<LocalTime>,
    pub custom_end: Option<LocalTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct SettingsDoc {
    #[serde(default)]
    daemon: DaemonSettings,
    // TOML table keys are strings; user ids are parsed on access.
    #[serde(default)]
    users: BTreeMap<String, UserSettings>,
}

impl SettingsDoc {
    fn user(&self, user: UserId) -> Option<&UserSettings> {
        self.users.get(&user.to_string())
    }
}

/// Settings store persisted as a TOML file.
pub struct FileSettingsStore {
    path: PathBuf,
    doc: Mutex<SettingsDoc>,
}

const DEFAULT_TEMPLATE: &str = "\
#[daemon]
#timezone = \"America/New_York\"  # IANA zone for the scheduling clock (default: TZ env or UTC)
#latitude = 40.7128               # Coordinates for twilight mode
#longitude = -74.0060
#rgb_path = \"/sys/class/graphics/fb0/rgb\"
#user = 0                         # User session attached on startup

[users.0]
activated = false
auto_mode = \"custom\"            # Select: \"manual\", \"custom\", \"twilight\"
custom_start = \"22:00\"          # Tint on (HH:MM)
custom_end = \"06:00\"            # Tint off (HH:MM)
";

impl FileSettingsStore {
    /// Open the settings file, creating it from the default template when it
    /// does not exist yet.
    pub fn load_or_create(custom_path: Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path,
            None => default_settings_path()?,
        };
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, DEFAULT_TEMPLATE)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log_block_start!("Created default settings at {}", path.display());
        }
        let doc = read_doc(&path)?;
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Daemon-level configuration as loaded.
    pub fn daemon(&self) -> DaemonSettings {
        self.doc.lock().unwrap().daemon.clone()
    }

    /// Re-read the file and report which keys changed, attributed to the
    /// user they belong to.
    ///
    /// Used by the file watcher to turn disk edits into settings-changed
    /// events. The daemon-level scheduling zone is diffed too; the other
    /// daemon keys take effect on restart only.
    pub fn reload(&self) -> Result<Vec<SettingKey>> {
        let fresh = read_doc(&self.path)?;
        let mut doc = self.doc.lock().unwrap();
        let mut changed = Vec::new();
        if doc.daemon.timezone != fresh.daemon.timezone {
            changed.push(SettingKey::Timezone);
        }
        let user_ids: std::collections::BTreeSet<&String> =
            doc.users.keys().chain(fresh.users.keys()).collect();
        for id in user_ids {
            // A table key that is not a user id cannot belong to a session.
            let Ok(user) = id.parse::<UserId>() else {
                continue;
            };
            let old = doc.users.get(id).cloned().unwrap_or_default();
            let new = fresh.users.get(id).cloned().unwrap_or_default();
            if old.activated != new.activated {
                changed.push(SettingKey::ActivationFlag(user));
            }
            if old.auto_mode != new.auto_mode {
                changed.push(SettingKey::AutoMode(user));
            }
            if old.custom_start != new.custom_start {
                changed.push(SettingKey::CustomStartTime(user));
            }
            if old.custom_end != new.custom_end {
                changed.push(SettingKey::CustomEndTime(user));
            }
        }
        *doc = fresh;
        Ok(changed)
    }

    fn persist(&self, doc: &SettingsDoc) -> Result<()> {
        let rendered = toml::to_string_pretty(doc).context("failed to render settings")?;
        std::fs::write(&self.path, rendered)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

fn read_doc(path: &Path) -> Result<SettingsDoc> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid settings in {}", path.display()))
}

fn default_settings_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not determine config directory")?;
    Ok(base.join(CONFIG_DIR).join(SETTINGS_FILE))
}

impl SettingsStore for FileSettingsStore {
    fn activation_flag(&self, user: UserId) -> bool {
        self.doc
            .lock()
            .unwrap()
            .user(user)
            .and_then(|u| u.activated)
            .unwrap_or(false)
    }

    fn set_activation_flag(&self, user: UserId, active: bool) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        doc.users.entry(user.to_string()).or_default().activated = Some(active);
        self.persist(&doc)
    }

    fn auto_mode(&self, user: UserId) -> AutoMode {
        self.doc
            .lock()
            .unwrap()
            .user(user)
            .and_then(|u| u.auto_mode)
            .unwrap_or(AutoMode::Manual)
    }

    fn custom_start_time(&self, user: UserId) -> LocalTime {
        self.doc
            .lock()
            .unwrap()
            .user(user)
            .and_then(|u| u.custom_start)
            .unwrap_or_else(default_custom_start)
    }

    fn custom_end_time(&self, user: UserId) -> LocalTime {
        self.doc
            .lock()
            .unwrap()
            .user(user)
            .and_then(|u| u.custom_end)
            .unwrap_or_else(default_custom_end)
    }
}

/// Default RGB path helper for the daemon wiring.
pub fn rgb_path_or_default(daemon: &DaemonSettings) -> PathBuf {
    daemon
        .rgb_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RGB_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Log;

    fn store_with(contents: &str) -> (tempfile::TempDir, FileSettingsStore) {
        Log::set_enabled(false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duskr.toml");
        std::fs::write(&path, contents).unwrap();
        let store = FileSettingsStore::load_or_create(Some(path)).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        Log::set_enabled(false);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("duskr.toml");
        let store = FileSettingsStore::load_or_create(Some(path.clone())).unwrap();
        assert!(path.exists());
        assert_eq!(store.auto_mode(0), AutoMode::Custom);
        assert!(!store.activation_flag(0));
        assert_eq!(store.custom_start_time(0).to_string(), "22:00");
        assert_eq!(store.custom_end_time(0).to_string(), "06:00");
    }

    #[test]
    fn unknown_user_falls_back_to_defaults() {
        let (_dir, store) = store_with("[users.0]\nauto_mode = \"twilight\"\n");
        assert_eq!(store.auto_mode(7), AutoMode::Manual);
        assert_eq!(store.custom_start_time(7).to_string(), "22:00");
        assert_eq!(store.custom_end_time(7).to_string(), "06:00");
        assert!(!store.activation_flag(7));
    }

    #[test]
    fn reads_per_user_values() {
        let (_dir, store) = store_with(
            "[users.3]\nactivated = true\nauto_mode = \"twilight\"\ncustom_start = \"21:15\"\ncustom_end = \"05:45\"\n",
        );
        assert!(store.activation_flag(3));
        assert_eq!(store.auto_mode(3), AutoMode::Twilight);
        assert_eq!(store.custom_start_time(3).to_string(), "21:15");
        assert_eq!(store.custom_end_time(3).to_string(), "05:45");
    }

    #[test]
    fn set_activation_flag_persists_to_disk() {
        let (_dir, store) = store_with("[users.0]\nauto_mode = \"custom\"\n");
        store.set_activation_flag(0, true).unwrap();
        assert!(store.activation_flag(0));

        // A fresh store sees the persisted value.
        let reopened = FileSettingsStore::load_or_create(Some(store.path().to_path_buf())).unwrap();
        assert!(reopened.activation_flag(0));
        assert_eq!(reopened.auto_mode(0), AutoMode::Custom);
    }

    #[test]
    fn reload_attributes_changes_to_their_user() {
        let (_dir, store) = store_with(
            "[users.0]\nauto_mode = \"custom\"\ncustom_start = \"22:00\"\n[users.1]\ncustom_start = \"22:00\"\n",
        );
        std::fs::write(
            store.path(),
            "[users.0]\nauto_mode = \"twilight\"\ncustom_start = \"22:00\"\n[users.1]\ncustom_start = \"23:00\"\n",
        )
        .unwrap();
        let changed = store.reload().unwrap();
        assert!(changed.contains(&SettingKey::AutoMode(0)));
        assert!(changed.contains(&SettingKey::CustomStartTime(1)));
        // User 0's start time did not change; no key for it.
        assert!(!changed.contains(&SettingKey::CustomStartTime(0)));
        assert!(!changed.contains(&SettingKey::CustomEndTime(0)));
        assert_eq!(store.auto_mode(0), AutoMode::Twilight);
    }

    #[test]
    fn reload_reports_a_timezone_change() {
        let (_dir, store) =
            store_with("[daemon]\ntimezone = \"UTC\"\n[users.0]\nauto_mode = \"custom\"\n");
        std::fs::write(
            store.path(),
            "[daemon]\ntimezone = \"Europe/Paris\"\n[users.0]\nauto_mode = \"custom\"\n",
        )
        .unwrap();
        let changed = store.reload().unwrap();
        assert_eq!(changed, vec![SettingKey::Timezone]);
        assert_eq!(store.daemon().timezone.as_deref(), Some("Europe/Paris"));
    }

    #[test]
    fn reload_with_no_changes_reports_nothing() {
        let (_dir, store) = store_with("[users.0]\nauto_mode = \"custom\"\n");
        let changed = store.reload().unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    #[serial_test::serial]
    fn default_path_respects_xdg_config_home() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
        let path = default_settings_path().unwrap();
        std::env::remove_var("XDG_CONFIG_HOME");
        assert_eq!(path, dir.path().join("duskr").join("duskr.toml"));
    }

    #[test]
    fn daemon_table_round_trips() {
        let (_dir, store) = store_with(
            "[daemon]\ntimezone = \"Europe/Paris\"\nlatitude = 48.85\nlongitude = 2.35\nuser = 2\n",
        );
        let daemon = store.daemon();
        assert_eq!(daemon.timezone.as_deref(), Some("Europe/Paris"));
        assert_eq!(daemon.user, Some(2));
        assert_eq!(
            rgb_path_or_default(&daemon),
            PathBuf::from("/sys/class/graphics/fb0/rgb")
        );
    }
}
