//! Signal handling.
//!
//! SIGTERM, SIGINT, and SIGHUP all request a clean shutdown: a background
//! thread forwards them as `Shutdown` events onto the session channel so the
//! coordinator loop can detach the session and restore the day preset before
//! exiting.

use std::sync::mpsc::Sender;
use std::thread;

use anyhow::{Context, Result};
use signal_hook::{
    consts::signal::{SIGHUP, SIGINT, SIGTERM},
    iterator::Signals,
};

use crate::coordinator::Event;

/// Register the shutdown signals and spawn the forwarding thread.
pub fn setup_signal_handler(events: Sender<Event>) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("failed to register signal handlers")?;

    thread::spawn(move || {
        for signal in signals.forever() {
            log_pipe!();
            log_info!("Received signal {signal}, shutting down");
            if events.send(Event::Shutdown).is_err() {
                break;
            }
        }
    });

    Ok(())
}
