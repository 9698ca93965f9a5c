//! Application-wide constants for duskr.

/// Default custom window start time (tint turns on).
pub const DEFAULT_CUSTOM_START: (u8, u8) = (22, 0);

/// Default custom window end time (tint turns off).
pub const DEFAULT_CUSTOM_END: (u8, u8) = (6, 0);

/// Night preset written to the RGB sysfs node (~3400 K).
pub const NIGHT_RGB_PRESET: &str = "32768 25000 15000\n";

/// Day preset written to the RGB sysfs node (neutral).
pub const DAY_RGB_PRESET: &str = "32768 32768 32768\n";

/// Default RGB sysfs node used by the sysfs tint backend.
pub const DEFAULT_RGB_PATH: &str = "/sys/class/graphics/fb0/rgb";

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "duskr.toml";

/// Config directory name under XDG_CONFIG_HOME.
pub const CONFIG_DIR: &str = "duskr";

// Clock anomaly thresholds (seconds). Forward jumps at or above the sleep
// threshold indicate suspend/resume; backwards jumps at or below the drift
// threshold are NTP corrections and are ignored.

/// Forward jump indicating the system resumed from suspend.
pub const SLEEP_DETECTION_THRESHOLD_SECS: u64 = 300;

/// Forward jump indicating a brief suspend or severe system delay.
pub const SHORT_SUSPEND_THRESHOLD_SECS: u64 = 30;

/// Backwards jump small enough to be NTP drift correction.
pub const CLOCK_DRIFT_THRESHOLD_SECS: u64 = 5;

/// Backwards jump within DST-transition magnitude.
pub const DST_TRANSITION_THRESHOLD_SECS: u64 = 3700;

/// Sampling interval of the clock monitor thread (seconds).
pub const CLOCK_MONITOR_INTERVAL_SECS: u64 = 10;

/// Debounce window for settings file change events (milliseconds).
pub const SETTINGS_DEBOUNCE_MS: u64 = 500;
