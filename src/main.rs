//! Daemon entry point.
//!
//! Parses the command line, claims the instance lock, wires every event
//! source (alarms, twilight boundaries, clock anomalies, settings edits,
//! shutdown signals) into one channel, and drains that channel into the
//! coordinator until a shutdown event arrives.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use anyhow::Result;
use chrono_tz::Tz;

use duskr::alarm::{AlarmScheduler, ThreadAlarmScheduler};
use duskr::args::{parse_args, print_help, CliAction};
use duskr::backend::SysfsBackend;
use duskr::clock::{spawn_clock_monitor, zone_from_env, Clock, SystemClock};
use duskr::coordinator::{Coordinator, Event};
use duskr::lock::InstanceLock;
use duskr::settings::file::rgb_path_or_default;
use duskr::settings::{FileSettingsStore, SettingKey, SettingsStore, SettingsWatcher, UserId};
use duskr::signals::setup_signal_handler;
use duskr::twilight::{SolarTwilightProvider, TwilightProvider};
use duskr::{
    log_block_start, log_end, log_error, log_indented, log_pipe, log_version, log_warning,
};

fn main() {
    match parse_args(std::env::args().skip(1)) {
        CliAction::Help => print_help(),
        CliAction::Version => println!("duskr {}", env!("CARGO_PKG_VERSION")),
        CliAction::Unknown(message) => {
            eprintln!("error: {message}");
            eprintln!();
            print_help();
            std::process::exit(2);
        }
        CliAction::Run {
            debug_enabled,
            config_path,
            user,
        } => {
            if let Err(err) = run(debug_enabled, config_path, user) {
                log_pipe!();
                log_error!("{err:#}");
                log_end!();
                std::process::exit(1);
            }
        }
    }
}

fn run(
    debug_enabled: bool,
    config_path: Option<PathBuf>,
    user_override: Option<UserId>,
) -> Result<()> {
    log_version!();

    let lock = InstanceLock::acquire()?;

    let settings = Arc::new(FileSettingsStore::load_or_create(config_path)?);
    let daemon = settings.daemon();
    log_block_start!("Loaded settings from {}", settings.path().display());

    let system_clock = Arc::new(SystemClock::new(scheduling_zone(daemon.timezone.as_deref())));
    log_indented!("Scheduling in zone {}", system_clock.zone());
    let clock: Arc<dyn Clock> = system_clock.clone();

    let (events, event_rx) = mpsc::channel::<Event>();

    setup_signal_handler(events.clone())?;

    let alarms = Arc::new(ThreadAlarmScheduler::spawn(
        Arc::clone(&clock),
        events.clone(),
    ));
    let twilight = Arc::new(SolarTwilightProvider::spawn(
        daemon.latitude,
        daemon.longitude,
        Arc::clone(&clock),
        events.clone(),
    ));
    let backend = SysfsBackend::new(rgb_path_or_default(&daemon));

    let _watcher = SettingsWatcher::spawn(Arc::clone(&settings), events.clone(), debug_enabled)?;

    let monitor_shutdown = Arc::new(AtomicBool::new(false));
    // Detached on exit; its channel sender closes with the process.
    let _monitor = spawn_clock_monitor(events.clone(), Arc::clone(&monitor_shutdown));

    let mut coordinator = Coordinator::new(
        Arc::clone(&clock),
        Arc::clone(&settings) as Arc<dyn SettingsStore>,
        Arc::clone(&alarms) as Arc<dyn AlarmScheduler>,
        Arc::clone(&twilight) as Arc<dyn TwilightProvider>,
        Box::new(backend),
    );

    let user = user_override.or(daemon.user).unwrap_or(0);
    coordinator.attach(user);

    while let Ok(event) = event_rx.recv() {
        match event {
            Event::Shutdown => break,
            // A timezone edit re-zones the clock before the coordinator
            // recomputes, so schedules see the new zone.
            Event::SettingChanged(SettingKey::Timezone) => {
                let zone = scheduling_zone(settings.daemon().timezone.as_deref());
                if zone != system_clock.zone() {
                    system_clock.set_zone(zone);
                    log_block_start!("Time zone changed to {zone}");
                    coordinator.handle_event(Event::TimeZoneChanged);
                }
            }
            other => coordinator.handle_event(other),
        }
    }

    coordinator.shutdown();
    monitor_shutdown.store(true, Ordering::SeqCst);
    alarms.shutdown();
    twilight.shutdown();
    lock.release();

    log_block_start!("Shutdown complete");
    log_end!();
    Ok(())
}

/// Resolve the zone to schedule in, preferring the settings file and
/// falling back to the environment on an unknown name.
fn scheduling_zone(timezone: Option<&str>) -> Tz {
    match timezone {
        Some(name) => match name.parse::<Tz>() {
            Ok(zone) => zone,
            Err(_) => {
                log_pipe!();
                log_warning!("Unknown timezone '{name}' in settings, falling back to TZ/UTC");
                zone_from_env()
            }
        },
        None => zone_from_env(),
    }
}
