//! Custom daily-window scheduling.
//!
//! The custom schedule activates the tint inside a user-configured window
//! `[start, end)` of local wall-clock time, where the window may cross
//! midnight. It owns at most one outstanding alarm, placed at the next
//! window edge, and recomputes on alarm fire, on time or time-zone changes,
//! and whenever its start or end time is edited.
//!
//! The delicate part is the time-zone hysteresis: a zone change alone must
//! not flip the tint. When the zone of the last applied transition differs
//! from the current zone and the fresh window decision disagrees with the
//! current activation, the last transition is re-expressed in the new zone
//! with its wall-clock reading preserved, and the flip only happens when
//! `now` has left the window that transition established. The active and
//! inactive cases use deliberately asymmetric bounds; keep the case split
//! as-is.

use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;

use crate::alarm::{next_alarm_token, AlarmScheduler, AlarmToken};
use crate::clock::Clock;
use crate::state::Activation;
use crate::window::{carry_wall_clock, LocalTime};

use super::Phase;

pub struct CustomSchedule {
    clock: Arc<dyn Clock>,
    alarms: Arc<dyn AlarmScheduler>,
    start: LocalTime,
    end: LocalTime,
    last_activated: Option<DateTime<Tz>>,
    pending_alarm: Option<AlarmToken>,
    phase: Phase,
}

impl CustomSchedule {
    pub fn new(
        clock: Arc<dyn Clock>,
        alarms: Arc<dyn AlarmScheduler>,
        start: LocalTime,
        end: LocalTime,
    ) -> Self {
        Self {
            clock,
            alarms,
            start,
            end,
            last_activated: None,
            pending_alarm: None,
            phase: Phase::Stopped,
        }
    }

    /// Transition to Running. The caller follows up with a recompute.
    pub fn start(&mut self) {
        self.phase = Phase::Running;
    }

    /// Transition to Stopped, canceling the pending alarm and discarding
    /// the transition stamp.
    pub fn stop(&mut self) {
        if let Some(token) = self.pending_alarm.take() {
            self.alarms.cancel(token);
        }
        self.last_activated = None;
        self.phase = Phase::Stopped;
    }

    /// Whether a fired alarm belongs to this schedule. Stale tokens from
    /// superseded alarms do not.
    pub fn owns_alarm(&self, token: AlarmToken) -> bool {
        self.pending_alarm == Some(token)
    }

    /// Decide whether activation should change.
    ///
    /// Returns `Some(active)` when an activation request should be issued to
    /// the coordinator (the coordinator deduplicates by value), `None` when
    /// the zone-change hysteresis suppresses a flip. The caller reschedules
    /// the alarm afterwards via `update_next_alarm`.
    pub fn recompute(&mut self, current: Activation) -> Option<bool> {
        if self.phase != Phase::Running {
            return None;
        }
        let now = self.clock.now();
        let window_start = self.start.occurrence_before(&now);
        let window_end = self.end.occurrence_after(&window_start);
        let should_be_active = now < window_end;

        let adopt = match (current.as_bool(), self.last_activated) {
            (Some(active), Some(last))
                if active != should_be_active && last.timezone() != now.timezone() =>
            {
                // Re-read the last transition in the new zone, keeping its
                // wall-clock reading authoritative, and only flip when `now`
                // has left the window that transition established.
                let zone = now.timezone();
                let last = carry_wall_clock(&last, &zone);
                self.last_activated = Some(last);
                if active {
                    now < self.start.occurrence_before(&last)
                        || now > self.end.occurrence_after(&last)
                } else {
                    now < self.end.occurrence_before(&last)
                        || now > self.start.occurrence_after(&last)
                }
            }
            _ => true,
        };
        adopt.then_some(should_be_active)
    }

    /// Place the single outstanding alarm at the next window edge: the end
    /// time while active, the start time while inactive. Replaces any
    /// pending alarm. No alarm is placed before activation is determined.
    pub fn update_next_alarm(&mut self, current: Activation) {
        if self.phase != Phase::Running {
            return;
        }
        let Some(active) = current.as_bool() else {
            return;
        };
        let now = self.clock.now();
        let next = if active {
            self.end.occurrence_after(&now)
        } else {
            self.start.occurrence_after(&now)
        };
        if let Some(old) = self.pending_alarm.take() {
            self.alarms.cancel(old);
        }
        let token = next_alarm_token();
        self.alarms.schedule_exact(next, token);
        self.pending_alarm = Some(token);
    }

    /// An activation change was applied: stamp the transition instant and
    /// move the alarm to the new next edge.
    pub fn on_activated(&mut self, active: bool, at: DateTime<Tz>) {
        self.last_activated = Some(at);
        self.update_next_alarm(Activation::from(active));
    }

    /// The start time was edited. The stale transition stamp is discarded;
    /// the caller follows up with a recompute.
    pub fn set_start_time(&mut self, start: LocalTime) {
        self.start = start;
        self.last_activated = None;
    }

    /// The end time was edited. Same contract as `set_start_time`.
    pub fn set_end_time(&mut self, end: LocalTime) {
        self.end = end;
        self.last_activated = None;
    }
}
