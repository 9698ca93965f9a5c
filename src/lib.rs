//! # Duskr Library
//!
//! Internal library for the duskr binary: an automatic day/night display
//! tint scheduler.
//!
//! ## Architecture
//!
//! - **Coordination**: `coordinator` owns the session and activation state
//!   and consumes every trigger through a single event channel
//! - **Scheduling**: `schedule` holds the two automatic strategies, the
//!   custom daily window and the twilight signal
//! - **Time**: `clock` abstracts the wall clock, `window` does the
//!   calendar-aware occurrence arithmetic, `alarm` delivers one-shot
//!   absolute-time wake-ups
//! - **Inputs**: `settings` for TOML-persisted configuration with
//!   hot-reload, `twilight` for the sunrise/sunset signal
//! - **Output**: `backend` applies the tint presets to the display
//! - **Infrastructure**: instance locking, signal handling, and logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod alarm;
pub mod args;
pub mod backend;
pub mod clock;
pub mod constants;
pub mod coordinator;
pub mod lock;
pub mod schedule;
pub mod settings;
pub mod signals;
pub mod state;
pub mod twilight;
pub mod window;
