//! Structured logging with visual formatting.
//!
//! Provides duskr's box-drawing log output style. Blocks are opened with
//! `log_block_start!`, continued with `log_decorated!`, and detail lines use
//! `log_indented!`. Semantic macros (`log_info!`, `log_warning!`, `log_error!`,
//! `log_debug!`) carry a `[LEVEL]` prefix and should be preceded by a
//! `log_pipe!` when they open a new conceptual block.
//!
//! Logging can be disabled globally for quiet operation during tests.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Main logging interface.
pub struct Log;

impl Log {
    /// Enable or disable logging at runtime.
    ///
    /// Tests disable logging so assertion output stays readable.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    /// Check if logging is currently enabled.
    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }
}

/// Write formatted output to stdout (needed by the macros).
pub fn write_output(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Log the application startup header.
#[macro_export]
macro_rules! log_version {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let formatted = format!("┏ duskr v{} ━━╸\n", env!("CARGO_PKG_VERSION"));
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            $crate::logger::write_output("╹\n");
        }
    }};
}

/// Log a block start message, initiating a new conceptual block.
#[macro_export]
macro_rules! log_block_start {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃\n┣ {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a decorated message, typically as part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┣ {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log an indented message for sub-items or details within a block.
#[macro_export]
macro_rules! log_indented {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃   {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            $crate::logger::write_output("┃\n");
        }
    }};
}

/// Log an informational message with an `[INFO]` prefix.
#[macro_export]
macro_rules! log_info {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃ [INFO] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a warning message with a `[WARNING]` prefix.
#[macro_export]
macro_rules! log_warning {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃ [WARNING] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log an error message with an `[ERROR]` prefix.
#[macro_export]
macro_rules! log_error {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃ [ERROR] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a debug message with a `[DEBUG]` prefix.
///
/// Callers gate these behind their own debug flag.
#[macro_export]
macro_rules! log_debug {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            let formatted = format!("┃ [DEBUG] {message}\n");
            $crate::logger::write_output(&formatted);
        }
    }};
}
