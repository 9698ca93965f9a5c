//! One-shot wall-clock alarms.
//!
//! The custom schedule asks for exactly one outstanding wake-up at an
//! absolute instant. `AlarmScheduler` is the seam; `ThreadAlarmScheduler`
//! is the production implementation, a background thread that waits on the
//! earliest deadline and delivers `AlarmFired` events into the session
//! channel. Alarms may fire late (the thread re-checks after every wake)
//! but never early.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration as StdDuration;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::clock::Clock;
use crate::coordinator::Event;

/// Identifies one scheduled alarm. Tokens are never reused, so a fire event
/// from a superseded alarm is recognizably stale.
pub type AlarmToken = u64;

static TOKEN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh alarm token.
pub fn next_alarm_token() -> AlarmToken {
    TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Scheduler of one-shot absolute-time wake-ups.
pub trait AlarmScheduler: Send + Sync {
    /// Arrange for an `AlarmFired(token)` delivery at or after `at`.
    fn schedule_exact(&self, at: DateTime<Tz>, token: AlarmToken);

    /// Drop a pending alarm. Unknown tokens are ignored.
    fn cancel(&self, token: AlarmToken);
}

struct AlarmInner {
    pending: Mutex<BTreeMap<AlarmToken, DateTime<Tz>>>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

/// Thread-backed alarm scheduler delivering into the session channel.
pub struct ThreadAlarmScheduler {
    inner: Arc<AlarmInner>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ThreadAlarmScheduler {
    pub fn spawn(clock: Arc<dyn Clock>, events: Sender<Event>) -> Self {
        let inner = Arc::new(AlarmInner {
            pending: Mutex::new(BTreeMap::new()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let thread_inner = Arc::clone(&inner);
        let handle = std::thread::spawn(move || run_alarm_thread(thread_inner, clock, events));
        Self {
            inner,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Stop the alarm thread. Pending alarms are discarded.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        {
            // Taking the lock serializes with the wait loop, so the notify
            // cannot land between its shutdown check and its wait.
            let _guard = self.inner.pending.lock().unwrap();
            self.inner.wakeup.notify_all();
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

fn run_alarm_thread(inner: Arc<AlarmInner>, clock: Arc<dyn Clock>, events: Sender<Event>) {
    let mut pending = inner.pending.lock().unwrap();
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let next = pending
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(token, at)| (*token, *at));
        match next {
            None => {
                pending = inner.wakeup.wait(pending).unwrap();
            }
            Some((token, at)) => {
                let now = clock.now();
                if now >= at {
                    pending.remove(&token);
                    if events.send(Event::AlarmFired(token)).is_err() {
                        break;
                    }
                } else {
                    let remaining = (at - now)
                        .to_std()
                        .unwrap_or(StdDuration::from_millis(1));
                    let (guard, _timeout) = inner.wakeup.wait_timeout(pending, remaining).unwrap();
                    pending = guard;
                }
            }
        }
    }
}

impl AlarmScheduler for ThreadAlarmScheduler {
    fn schedule_exact(&self, at: DateTime<Tz>, token: AlarmToken) {
        self.inner.pending.lock().unwrap().insert(token, at);
        self.inner.wakeup.notify_all();
    }

    fn cancel(&self, token: AlarmToken) {
        self.inner.pending.lock().unwrap().remove(&token);
        self.inner.wakeup.notify_all();
    }
}

/// Alarm call made against a `RecordingAlarmScheduler`.
#[cfg(any(test, feature = "testing-support"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmCall {
    Schedule { at: DateTime<Tz>, token: AlarmToken },
    Cancel { token: AlarmToken },
}

/// Recording scheduler for tests: remembers every call and the currently
/// pending alarms, fires nothing on its own.
#[cfg(any(test, feature = "testing-support"))]
#[derive(Default)]
pub struct RecordingAlarmScheduler {
    calls: Mutex<Vec<AlarmCall>>,
    pending: Mutex<BTreeMap<AlarmToken, DateTime<Tz>>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl RecordingAlarmScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AlarmCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, AlarmCall::Cancel { .. }))
            .count()
    }

    /// The single pending alarm, when exactly one is outstanding.
    pub fn pending(&self) -> Option<(AlarmToken, DateTime<Tz>)> {
        let pending = self.pending.lock().unwrap();
        if pending.len() == 1 {
            pending.iter().next().map(|(token, at)| (*token, *at))
        } else {
            None
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl AlarmScheduler for RecordingAlarmScheduler {
    fn schedule_exact(&self, at: DateTime<Tz>, token: AlarmToken) {
        self.calls
            .lock()
            .unwrap()
            .push(AlarmCall::Schedule { at, token });
        self.pending.lock().unwrap().insert(token, at);
    }

    fn cancel(&self, token: AlarmToken) {
        self.calls.lock().unwrap().push(AlarmCall::Cancel { token });
        self.pending.lock().unwrap().remove(&token);
    }
}
