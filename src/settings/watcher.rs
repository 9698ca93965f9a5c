//! File watching for settings hot reload.
//!
//! Watches the settings file and turns disk edits into `SettingChanged`
//! events on the session channel, one per changed key. Events are debounced
//! because editors typically write files in several steps.

use std::path::PathBuf;
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::constants::SETTINGS_DEBOUNCE_MS;
use crate::coordinator::Event;
use crate::settings::FileSettingsStore;

/// Watches the settings file and injects settings-changed events.
pub struct SettingsWatcher {
    // Held for its Drop: dropping the watcher stops the notify thread.
    _watcher: RecommendedWatcher,
}

impl SettingsWatcher {
    /// Start watching the store's file. The watcher lives as long as the
    /// returned value.
    pub fn spawn(
        store: Arc<FileSettingsStore>,
        events: Sender<Event>,
        debug_enabled: bool,
    ) -> Result<Self> {
        let path = store.path().to_path_buf();
        // Watch the parent directory: editors replace files rather than
        // writing in place, which would drop an inode watch.
        let watch_dir = path
            .parent()
            .map(PathBuf::from)
            .context("settings file has no parent directory")?;

        if debug_enabled {
            log_pipe!();
            log_debug!("Watching settings file: {}", path.display());
        }

        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<NotifyEvent>();
        let mut watcher = RecommendedWatcher::new(
            move |result: std::result::Result<NotifyEvent, notify::Error>| {
                if let Ok(event) = result {
                    let _ = raw_tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .context("failed to create settings watcher")?;
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", watch_dir.display()))?;

        std::thread::spawn(move || {
            let debounce = Duration::from_millis(SETTINGS_DEBOUNCE_MS);
            // Trailing-edge debounce: after the first relevant event, keep
            // absorbing follow-up events and reload only once the file has
            // been quiet for the full debounce window. Editors write files
            // in several steps; only the final content matters.
            let mut dirty = false;
            loop {
                if dirty {
                    match raw_rx.recv_timeout(debounce) {
                        Ok(_) => continue,
                        Err(RecvTimeoutError::Timeout) => {
                            dirty = false;
                            match store.reload() {
                                Ok(changed) => {
                                    for key in changed {
                                        if events.send(Event::SettingChanged(key)).is_err() {
                                            return;
                                        }
                                    }
                                }
                                Err(e) => {
                                    log_pipe!();
                                    log_warning!("Ignoring unreadable settings change: {e}");
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                } else {
                    match raw_rx.recv() {
                        Ok(event) => dirty = is_relevant(&event, &path),
                        Err(_) => return,
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

fn is_relevant(event: &NotifyEvent, path: &PathBuf) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches && event.paths.iter().any(|p| p == path)
}
