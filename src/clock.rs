//! Clock abstraction and wall-clock anomaly detection.
//!
//! All scheduling instants in duskr are `DateTime<chrono_tz::Tz>`, so the
//! time zone a decision was made in stays observable. The `Clock` trait is
//! the single source of "now" for the scheduling core; `SystemClock` is the
//! production implementation and `ManualClock` (behind `testing-support`)
//! lets tests set the time and switch zones.
//!
//! The clock monitor thread watches wall-clock time for jumps (suspend and
//! resume, DST shifts, manual clock changes, NTP corrections) and injects a
//! time-changed event so a running schedule recomputes. Small backwards
//! jumps are ignored to avoid reacting to NTP drift correction.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::constants::{
    CLOCK_DRIFT_THRESHOLD_SECS, CLOCK_MONITOR_INTERVAL_SECS, DST_TRANSITION_THRESHOLD_SECS,
    SHORT_SUSPEND_THRESHOLD_SECS, SLEEP_DETECTION_THRESHOLD_SECS,
};
use crate::coordinator::Event;

/// Source of the current instant for the scheduling core.
pub trait Clock: Send + Sync {
    /// The current instant, carrying the zone it should be interpreted in.
    fn now(&self) -> DateTime<Tz>;
}

/// Resolve the zone from the `TZ` environment variable, falling back to UTC
/// when it is unset or not a recognized IANA name.
pub fn zone_from_env() -> Tz {
    std::env::var("TZ")
        .ok()
        .and_then(|name| Tz::from_str(&name).ok())
        .unwrap_or(Tz::UTC)
}

/// Production clock reading system time in a configured zone.
///
/// The zone is switchable at runtime so a settings edit can move a live
/// session to a new zone without a restart.
pub struct SystemClock {
    zone: std::sync::Mutex<Tz>,
}

impl SystemClock {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone: std::sync::Mutex::new(zone),
        }
    }

    pub fn from_env() -> Self {
        Self::new(zone_from_env())
    }

    pub fn zone(&self) -> Tz {
        *self.zone.lock().unwrap()
    }

    /// Switch the scheduling zone. Takes effect on the next `now` reading.
    pub fn set_zone(&self, zone: Tz) {
        *self.zone.lock().unwrap() = zone;
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone())
    }
}

/// Manually driven clock for tests.
///
/// `set_zone` re-expresses the held instant in the new zone without moving
/// it, which is exactly what a system time-zone change does to wall-clock
/// readings.
#[cfg(any(test, feature = "testing-support"))]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Tz>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl ManualClock {
    pub fn new(now: DateTime<Tz>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
    }

    pub fn set_zone(&self, zone: Tz) {
        let mut guard = self.now.lock().unwrap();
        *guard = guard.with_timezone(&zone);
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock().unwrap()
    }
}

/// Classify a wall-clock jump between the expected and observed instant.
///
/// Returns `(should_recompute, message)`: whether schedules should be forced
/// to recompute, and a description for the caller to log.
pub fn classify_clock_jump(
    current: SystemTime,
    expected: SystemTime,
) -> (bool, Option<String>) {
    match current.duration_since(expected) {
        Ok(forward) => {
            let secs = forward.as_secs();
            if secs >= SLEEP_DETECTION_THRESHOLD_SECS {
                let minutes = secs / 60;
                (
                    true,
                    Some(format!(
                        "Long time jump detected ({minutes} minutes). System likely resumed from suspend."
                    )),
                )
            } else if secs >= SHORT_SUSPEND_THRESHOLD_SECS {
                (
                    true,
                    Some(format!(
                        "Short time jump detected ({secs} seconds). Possible brief suspend or system delay."
                    )),
                )
            } else {
                (false, None)
            }
        }
        Err(_) => match expected.duration_since(current) {
            Ok(backwards) => {
                let secs = backwards.as_secs();
                if secs <= CLOCK_DRIFT_THRESHOLD_SECS {
                    // NTP drift correction, ignore
                    (false, None)
                } else if secs <= DST_TRANSITION_THRESHOLD_SECS {
                    (
                        true,
                        Some(format!(
                            "Time went backwards by {secs} seconds. Possible DST transition or clock adjustment."
                        )),
                    )
                } else {
                    let minutes = secs / 60;
                    (
                        true,
                        Some(format!(
                            "Large backwards time jump detected ({minutes} minutes). Major clock adjustment."
                        )),
                    )
                }
            }
            Err(_) => (
                true,
                Some("Unable to calculate time difference. Forcing recompute.".to_string()),
            ),
        },
    }
}

/// Spawn the clock monitor thread.
///
/// Samples wall-clock time on a fixed interval and sends `Event::TimeChanged`
/// into the session channel whenever a significant jump is observed. The
/// thread ends when `shutdown` is set or the channel closes.
pub fn spawn_clock_monitor(events: Sender<Event>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let interval = StdDuration::from_secs(CLOCK_MONITOR_INTERVAL_SECS);
        let mut last_check = SystemTime::now();
        loop {
            std::thread::sleep(interval);
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let now = SystemTime::now();
            let expected = last_check + interval;
            let (should_recompute, message) = classify_clock_jump(now, expected);
            if let Some(message) = message {
                log_pipe!();
                log_warning!("{}", message);
            }
            if should_recompute && events.send(Event::TimeChanged).is_err() {
                break;
            }
            last_check = now;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normal_interval_is_not_an_anomaly() {
        let expected = SystemTime::now();
        let current = expected + StdDuration::from_secs(2);
        let (recompute, message) = classify_clock_jump(current, expected);
        assert!(!recompute);
        assert!(message.is_none());
    }

    #[test]
    fn suspend_resume_forces_recompute() {
        let expected = SystemTime::now();
        let current = expected + StdDuration::from_secs(3 * 3600);
        let (recompute, message) = classify_clock_jump(current, expected);
        assert!(recompute);
        assert!(message.unwrap().contains("resumed from suspend"));
    }

    #[test]
    fn short_forward_jump_forces_recompute() {
        let expected = SystemTime::now();
        let current = expected + StdDuration::from_secs(45);
        let (recompute, _) = classify_clock_jump(current, expected);
        assert!(recompute);
    }

    #[test]
    fn ntp_drift_is_ignored() {
        let current = SystemTime::now();
        let expected = current + StdDuration::from_secs(3);
        let (recompute, message) = classify_clock_jump(current, expected);
        assert!(!recompute);
        assert!(message.is_none());
    }

    #[test]
    fn large_backwards_jump_forces_recompute() {
        let current = SystemTime::now();
        let expected = current + StdDuration::from_secs(7200);
        let (recompute, message) = classify_clock_jump(current, expected);
        assert!(recompute);
        assert!(message.unwrap().contains("backwards"));
    }

    #[test]
    fn system_clock_zone_is_switchable_at_runtime() {
        let clock = SystemClock::new(Tz::UTC);
        assert_eq!(clock.zone(), Tz::UTC);
        assert_eq!(clock.now().timezone(), Tz::UTC);

        clock.set_zone(chrono_tz::Europe::Paris);
        assert_eq!(clock.zone(), chrono_tz::Europe::Paris);
        assert_eq!(clock.now().timezone(), chrono_tz::Europe::Paris);
    }

    #[test]
    fn manual_clock_zone_switch_keeps_the_instant() {
        let start = chrono_tz::America::New_York
            .with_ymd_and_hms(2024, 6, 1, 23, 30, 0)
            .unwrap();
        let clock = ManualClock::new(start);
        clock.set_zone(chrono_tz::Europe::Paris);
        let now = clock.now();
        assert_eq!(now.timezone(), chrono_tz::Europe::Paris);
        // Same absolute instant, different wall-clock reading.
        assert_eq!(now.with_timezone(&chrono_tz::America::New_York), start);
    }
}
