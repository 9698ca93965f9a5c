//! Twilight (day/night) state provider.
//!
//! The twilight schedule mode consumes a day/night boolean through the
//! `TwilightProvider` trait. `SolarTwilightProvider` is the production
//! implementation: it derives the boundary from sunrise/sunset at configured
//! coordinates and pushes a twilight-changed event at each boundary while
//! anyone is subscribed. Without coordinates the state is absent, which
//! consumers treat as "not night".

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Days};
use chrono_tz::Tz;
use sunrise::{Coordinates, SolarDay, SolarEvent};

use crate::clock::Clock;
use crate::coordinator::Event;

/// Identifies one twilight listener subscription.
pub type SubscriptionId = u64;

/// Snapshot of the day/night signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwilightState {
    is_night: bool,
}

impl TwilightState {
    pub fn new(is_night: bool) -> Self {
        Self { is_night }
    }

    pub fn is_night(&self) -> bool {
        self.is_night
    }
}

/// Source of the day/night signal.
pub trait TwilightProvider: Send + Sync {
    /// Current state; `None` when the signal is unavailable.
    fn current_state(&self) -> Option<TwilightState>;

    /// Register interest in change pushes.
    fn subscribe(&self) -> SubscriptionId;

    /// Drop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

struct SolarInner {
    coords: Option<Coordinates>,
    clock: Arc<dyn Clock>,
    listeners: Mutex<HashSet<SubscriptionId>>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
    // Wakes the boundary thread on subscribe/unsubscribe/shutdown.
    wakeup: Condvar,
    wakeup_lock: Mutex<()>,
}

/// Twilight provider computing day/night from solar position.
pub struct SolarTwilightProvider {
    inner: Arc<SolarInner>,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    events: Sender<Event>,
}

impl SolarTwilightProvider {
    /// Create the provider and start its boundary thread. Coordinates may be
    /// absent, in which case `current_state` is always `None` and no pushes
    /// happen.
    pub fn spawn(
        latitude: Option<f64>,
        longitude: Option<f64>,
        clock: Arc<dyn Clock>,
        events: Sender<Event>,
    ) -> Self {
        let coords = match (latitude, longitude) {
            (Some(lat), Some(lon)) => {
                let coords = Coordinates::new(lat, lon);
                if coords.is_none() {
                    log_pipe!();
                    log_warning!("Invalid coordinates ({lat}, {lon}); twilight state unavailable");
                }
                coords
            }
            _ => None,
        };
        let inner = Arc::new(SolarInner {
            coords,
            clock,
            listeners: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            wakeup: Condvar::new(),
            wakeup_lock: Mutex::new(()),
        });
        let handle = if inner.coords.is_some() {
            let thread_inner = Arc::clone(&inner);
            let thread_events = events.clone();
            Some(std::thread::spawn(move || {
                run_boundary_thread(thread_inner, thread_events)
            }))
        } else {
            None
        };
        Self {
            inner,
            handle: Mutex::new(handle),
            events,
        }
    }

    /// Stop the boundary thread.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        {
            // Serializes with the boundary loop's shutdown check.
            let _guard = self.inner.wakeup_lock.lock().unwrap();
            self.inner.wakeup.notify_all();
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        // Keep the sender alive until here so the channel does not close
        // while the thread still runs.
        let _ = &self.events;
    }
}

fn run_boundary_thread(inner: Arc<SolarInner>, events: Sender<Event>) {
    loop {
        let guard = inner.wakeup_lock.lock().unwrap();
        // Checked under the lock so a shutdown or subscribe notify cannot
        // slip between the check and the wait.
        if inner.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let has_listeners = !inner.listeners.lock().unwrap().is_empty();
        if !has_listeners {
            // Nothing to notify; park until a subscription arrives.
            let _unused = inner.wakeup.wait(guard).unwrap();
            continue;
        }
        let now = inner.clock.now();
        let Some(boundary) = next_boundary(&inner, &now) else {
            let _unused = inner
                .wakeup
                .wait_timeout(guard, StdDuration::from_secs(3600))
                .unwrap();
            continue;
        };
        let remaining = (boundary - now)
            .to_std()
            .unwrap_or(StdDuration::from_millis(1));
        let (_guard, timeout) = inner.wakeup.wait_timeout(guard, remaining).unwrap();
        if timeout.timed_out() && !inner.shutdown.load(Ordering::SeqCst) {
            let still_listening = !inner.listeners.lock().unwrap().is_empty();
            if still_listening && events.send(Event::TwilightChanged).is_err() {
                break;
            }
        }
    }
}

fn next_boundary(inner: &SolarInner, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let coords = inner.coords?;
    let zone = now.timezone();
    let mut candidates = Vec::with_capacity(4);
    for date in [
        now.date_naive(),
        now.date_naive().checked_add_days(Days::new(1))?,
    ] {
        let day = SolarDay::new(coords, date);
        candidates.push(day.event_time(SolarEvent::Sunrise).with_timezone(&zone));
        candidates.push(day.event_time(SolarEvent::Sunset).with_timezone(&zone));
    }
    candidates.into_iter().filter(|at| at > now).min()
}

impl TwilightProvider for SolarTwilightProvider {
    fn current_state(&self) -> Option<TwilightState> {
        let coords = self.inner.coords?;
        let now = self.inner.clock.now();
        let zone = now.timezone();
        let day = SolarDay::new(coords, now.date_naive());
        let sunrise = day.event_time(SolarEvent::Sunrise).with_timezone(&zone);
        let sunset = day.event_time(SolarEvent::Sunset).with_timezone(&zone);
        let is_night = now < sunrise || now >= sunset;
        Some(TwilightState::new(is_night))
    }

    fn subscribe(&self) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        // Same lock order as the boundary loop: wakeup_lock, then listeners.
        let _guard = self.inner.wakeup_lock.lock().unwrap();
        self.inner.listeners.lock().unwrap().insert(id);
        self.inner.wakeup.notify_all();
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let _guard = self.inner.wakeup_lock.lock().unwrap();
        self.inner.listeners.lock().unwrap().remove(&id);
        self.inner.wakeup.notify_all();
    }
}

/// Scriptable provider for tests: state is set directly, subscriptions are
/// recorded.
#[cfg(any(test, feature = "testing-support"))]
#[derive(Default)]
pub struct StaticTwilightProvider {
    state: Mutex<Option<TwilightState>>,
    listeners: Mutex<HashSet<SubscriptionId>>,
    next_id: AtomicU64,
    unsubscribe_calls: AtomicU64,
}

#[cfg(any(test, feature = "testing-support"))]
impl StaticTwilightProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: Option<TwilightState>) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_night(&self, is_night: bool) {
        self.set_state(Some(TwilightState::new(is_night)));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    pub fn unsubscribe_calls(&self) -> u64 {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl TwilightProvider for StaticTwilightProvider {
    fn current_state(&self) -> Option<TwilightState> {
        *self.state.lock().unwrap()
    }

    fn subscribe(&self) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().insert(id);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().remove(&id);
    }
}
