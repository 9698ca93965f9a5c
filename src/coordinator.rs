//! Session coordination.
//!
//! The coordinator is the single writer of activation state. Alarm fires,
//! twilight pushes, clock anomalies, and settings edits all arrive as
//! `Event`s on one channel and are handled here on one thread, so mode
//! switches, recomputes, and backend writes never race.
//!
//! One session is live at a time. Attaching a user starts the persisted
//! auto-mode and determines the initial activation; detaching stops the mode
//! synchronously, releasing its alarm or twilight subscription before the
//! session is dropped.

use std::sync::Arc;

use crate::alarm::{AlarmScheduler, AlarmToken};
use crate::backend::TintBackend;
use crate::clock::Clock;
use crate::schedule::{CustomSchedule, ScheduleMode, TwilightSchedule};
use crate::settings::{AutoMode, SettingKey, SettingsStore, UserId};
use crate::state::{Activation, ActivationState};
use crate::twilight::TwilightProvider;

/// Everything that can wake the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A scheduled alarm came due.
    AlarmFired(AlarmToken),
    /// The system clock jumped (suspend, manual adjustment).
    TimeChanged,
    /// The effective time zone changed.
    TimeZoneChanged,
    /// The twilight provider crossed a day/night boundary.
    TwilightChanged,
    /// A settings entry changed on disk.
    SettingChanged(SettingKey),
    /// Terminate the event loop.
    Shutdown,
}

struct Session {
    user: UserId,
    activation: ActivationState,
    auto_mode: AutoMode,
    mode: Option<ScheduleMode>,
}

pub struct Coordinator {
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsStore>,
    alarms: Arc<dyn AlarmScheduler>,
    twilight: Arc<dyn TwilightProvider>,
    backend: Box<dyn TintBackend>,
    session: Option<Session>,
}

impl Coordinator {
    pub fn new(
        clock: Arc<dyn Clock>,
        settings: Arc<dyn SettingsStore>,
        alarms: Arc<dyn AlarmScheduler>,
        twilight: Arc<dyn TwilightProvider>,
        backend: Box<dyn TintBackend>,
    ) -> Self {
        Self {
            clock,
            settings,
            alarms,
            twilight,
            backend,
            session: None,
        }
    }

    /// Begin a session for `user`: start the persisted auto-mode and
    /// determine the initial activation. Any previous session is detached
    /// first.
    pub fn attach(&mut self, user: UserId) {
        self.detach();
        let auto_mode = self.settings.auto_mode(user);
        log_block_start!("Attaching session for user {user} ({auto_mode:?} mode)");
        self.session = Some(Session {
            user,
            activation: ActivationState::new(),
            auto_mode,
            mode: None,
        });
        self.start_mode(auto_mode);
        // A mode may already have determined activation; otherwise the
        // persisted flag decides.
        let undetermined = self
            .session
            .as_ref()
            .is_some_and(|session| session.activation.as_bool().is_none());
        if undetermined {
            let flag = self.settings.activation_flag(user);
            self.request_activation(flag);
        }
    }

    /// End the current session, stopping its mode synchronously. A no-op
    /// when no session is attached.
    pub fn detach(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(mut mode) = session.mode.take() {
                mode.stop();
            }
            log_block_start!("Detached session for user {}", session.user);
        }
    }

    /// Switch the auto-mode. The old mode is stopped, and its alarm or
    /// subscription released, before the new one starts.
    pub fn set_auto_mode(&mut self, auto_mode: AutoMode) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.auto_mode == auto_mode {
            return;
        }
        session.auto_mode = auto_mode;
        log_block_start!("Switching to {auto_mode:?} mode");
        self.start_mode(auto_mode);
    }

    /// Detach and restore the neutral day preset on the way out. The
    /// persisted activation flag is left untouched so the user's choice
    /// survives the restart.
    pub fn shutdown(&mut self) {
        self.detach();
        if let Err(err) = self.backend.apply_day_preset() {
            log_pipe!();
            log_warning!("Failed to restore day preset: {err}");
        }
    }

    /// Current activation, for observation.
    pub fn activation(&self) -> Activation {
        self.session
            .as_ref()
            .map_or(Activation::Unknown, |session| session.activation.value())
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    pub fn handle_event(&mut self, event: Event) {
        let Some(user) = self.session.as_ref().map(|session| session.user) else {
            return;
        };
        match event {
            Event::AlarmFired(token) => {
                let owned = self
                    .session
                    .as_mut()
                    .and_then(|session| session.mode.as_mut())
                    .and_then(|mode| mode.as_custom_mut())
                    .is_some_and(|custom| custom.owns_alarm(token));
                // Fires from superseded alarms are stale and ignored.
                if owned {
                    self.custom_recompute();
                }
            }
            Event::TimeChanged | Event::TimeZoneChanged => {
                self.custom_recompute();
            }
            Event::TwilightChanged => {
                self.twilight_recompute();
            }
            Event::SettingChanged(key) => self.handle_setting_change(user, key),
            Event::Shutdown => {}
        }
    }

    fn handle_setting_change(&mut self, user: UserId, key: SettingKey) {
        match key {
            SettingKey::Timezone => {
                // The clock has already been re-zoned by the time this arrives.
                self.custom_recompute();
            }
            SettingKey::ActivationFlag(changed) if changed == user => {
                let flag = self.settings.activation_flag(user);
                self.request_activation(flag);
            }
            SettingKey::AutoMode(changed) if changed == user => {
                let auto_mode = self.settings.auto_mode(user);
                self.set_auto_mode(auto_mode);
            }
            SettingKey::CustomStartTime(changed) if changed == user => {
                let start = self.settings.custom_start_time(user);
                if let Some(custom) = self.custom_mut() {
                    custom.set_start_time(start);
                    self.custom_recompute();
                }
            }
            SettingKey::CustomEndTime(changed) if changed == user => {
                let end = self.settings.custom_end_time(user);
                if let Some(custom) = self.custom_mut() {
                    custom.set_end_time(end);
                    self.custom_recompute();
                }
            }
            // Edits to users without a live session are not ours to act on.
            _ => {}
        }
    }

    /// Apply an activation change, ignoring requests that match the current
    /// value. The first request of a session always applies.
    pub fn request_activation(&mut self, active: bool) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.activation.as_bool() == Some(active) {
            return;
        }
        let now = self.clock.now();
        session.activation.set(active, now);
        let user = session.user;
        log_block_start!(
            "Tint {} at {}",
            if active { "activated" } else { "deactivated" },
            now.format("%H:%M:%S %Z")
        );
        if let Err(err) = self.settings.set_activation_flag(user, active) {
            log_pipe!();
            log_warning!("Failed to persist activation flag: {err}");
        }
        if let Some(mode) = self.session.as_mut().and_then(|session| session.mode.as_mut()) {
            mode.on_activated(active, now);
        }
        let applied = if active {
            self.backend.apply_night_preset()
        } else {
            self.backend.apply_day_preset()
        };
        match applied {
            Ok(()) => log_indented!(
                "Applied {} preset via {} backend",
                if active { "night" } else { "day" },
                self.backend.name()
            ),
            Err(err) => {
                log_pipe!();
                log_error!("{} backend rejected preset: {err}", self.backend.name());
            }
        }
    }

    /// Stop whatever mode is running and start the one for `auto_mode`,
    /// including its initial recompute.
    fn start_mode(&mut self, auto_mode: AutoMode) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(mut old) = session.mode.take() {
            old.stop();
        }
        let user = session.user;
        match auto_mode {
            AutoMode::Manual => {}
            AutoMode::Custom => {
                let mut custom = CustomSchedule::new(
                    Arc::clone(&self.clock),
                    Arc::clone(&self.alarms),
                    self.settings.custom_start_time(user),
                    self.settings.custom_end_time(user),
                );
                custom.start();
                session.mode = Some(ScheduleMode::Custom(custom));
                self.custom_recompute();
            }
            AutoMode::Twilight => {
                let mut twilight = TwilightSchedule::new(Arc::clone(&self.twilight));
                twilight.start();
                session.mode = Some(ScheduleMode::Twilight(twilight));
                self.twilight_recompute();
            }
        }
    }

    fn custom_mut(&mut self) -> Option<&mut CustomSchedule> {
        self.session
            .as_mut()
            .and_then(|session| session.mode.as_mut())
            .and_then(|mode| mode.as_custom_mut())
    }

    fn twilight_mut(&mut self) -> Option<&mut TwilightSchedule> {
        self.session
            .as_mut()
            .and_then(|session| session.mode.as_mut())
            .and_then(|mode| mode.as_twilight_mut())
    }

    /// Re-evaluate the custom window, apply any flip it requests, then
    /// reschedule the edge alarm against the (possibly updated) activation.
    fn custom_recompute(&mut self) {
        let current = self.activation();
        let Some(request) = self.custom_mut().map(|custom| custom.recompute(current)) else {
            return;
        };
        if let Some(active) = request {
            self.request_activation(active);
        }
        let current = self.activation();
        if let Some(custom) = self.custom_mut() {
            custom.update_next_alarm(current);
        }
    }

    fn twilight_recompute(&mut self) {
        let current = self.activation();
        let request = self
            .twilight_mut()
            .and_then(|twilight| twilight.recompute(current));
        if let Some(active) = request {
            self.request_activation(active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::RecordingAlarmScheduler;
    use crate::backend::RecordingBackend;
    use crate::clock::ManualClock;
    use crate::settings::MemorySettingsStore;
    use crate::twilight::StaticTwilightProvider;
    use crate::window::LocalTime;
    use anyhow::Result;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    const USER: UserId = 1000;

    struct Fixture {
        clock: Arc<ManualClock>,
        settings: Arc<MemorySettingsStore>,
        alarms: Arc<RecordingAlarmScheduler>,
        twilight: Arc<StaticTwilightProvider>,
        backend: RecordingBackend,
        coordinator: Coordinator,
    }

    fn fixture(auto_mode: AutoMode, hour: u32, minute: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Tz::UTC.with_ymd_and_hms(2024, 3, 10, hour, minute, 0).unwrap(),
        ));
        let settings = Arc::new(MemorySettingsStore::new(auto_mode));
        let alarms = Arc::new(RecordingAlarmScheduler::new());
        let twilight = Arc::new(StaticTwilightProvider::new());
        let backend = RecordingBackend::new();
        let coordinator = Coordinator::new(
            clock.clone(),
            settings.clone(),
            alarms.clone(),
            twilight.clone(),
            Box::new(backend.clone()),
        );
        Fixture {
            clock,
            settings,
            alarms,
            twilight,
            backend,
            coordinator,
        }
    }

    #[test]
    fn manual_attach_applies_the_persisted_flag() {
        let mut f = fixture(AutoMode::Manual, 12, 0);
        f.settings.set_activated(true);
        f.coordinator.attach(USER);

        assert_eq!(f.coordinator.activation(), Activation::On);
        assert_eq!(f.backend.applied(), vec![true]);
        assert_eq!(f.alarms.pending_count(), 0);
    }

    #[test]
    fn custom_attach_inside_the_window_activates_and_schedules() {
        // Default window 22:00-06:00, attached at 23:30.
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);

        assert_eq!(f.coordinator.activation(), Activation::On);
        assert_eq!(f.backend.applied(), vec![true]);
        let (_, at) = f.alarms.pending().unwrap();
        assert_eq!(at, Tz::UTC.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap());
        // The flip was persisted.
        assert_eq!(f.settings.persisted_flags(), vec![true]);
    }

    #[test]
    fn alarm_fire_at_the_window_end_deactivates() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        let (token, _) = f.alarms.pending().unwrap();

        f.clock
            .set(Tz::UTC.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap());
        f.coordinator.handle_event(Event::AlarmFired(token));

        assert_eq!(f.coordinator.activation(), Activation::Off);
        assert_eq!(f.backend.applied(), vec![true, false]);
        // The next alarm waits at the window start.
        let (_, at) = f.alarms.pending().unwrap();
        assert_eq!(at, Tz::UTC.with_ymd_and_hms(2024, 3, 11, 22, 0, 0).unwrap());
    }

    #[test]
    fn stale_alarm_fires_are_ignored() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        let (token, _) = f.alarms.pending().unwrap();

        f.clock
            .set(Tz::UTC.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap());
        f.coordinator.handle_event(Event::AlarmFired(token + 1000));

        assert_eq!(f.coordinator.activation(), Activation::On);
        assert_eq!(f.backend.applied(), vec![true]);
    }

    #[test]
    fn duplicate_activation_requests_are_dropped() {
        let mut f = fixture(AutoMode::Manual, 12, 0);
        f.settings.set_activated(true);
        f.coordinator.attach(USER);
        assert_eq!(f.backend.applied(), vec![true]);

        // The watcher echoes our own persist back; same value, no effect.
        f.coordinator
            .handle_event(Event::SettingChanged(SettingKey::ActivationFlag(USER)));
        assert_eq!(f.backend.applied(), vec![true]);

        f.settings.set_activated(false);
        f.coordinator
            .handle_event(Event::SettingChanged(SettingKey::ActivationFlag(USER)));
        assert_eq!(f.backend.applied(), vec![true, false]);
    }

    #[test]
    fn switching_to_twilight_releases_the_alarm_and_subscribes() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.twilight.set_night(true);
        f.coordinator.attach(USER);
        assert_eq!(f.alarms.pending_count(), 1);

        f.settings.set_auto_mode(AutoMode::Twilight);
        f.coordinator
            .handle_event(Event::SettingChanged(SettingKey::AutoMode(USER)));

        assert_eq!(f.alarms.pending_count(), 0);
        assert_eq!(f.twilight.listener_count(), 1);
        // Night agreed with the custom window; no extra backend write.
        assert_eq!(f.backend.applied(), vec![true]);
    }

    #[test]
    fn repeated_auto_mode_value_does_not_restart_the_mode() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        let (token, _) = f.alarms.pending().unwrap();

        f.coordinator
            .handle_event(Event::SettingChanged(SettingKey::AutoMode(USER)));
        // Same mode value; the pending alarm survives untouched.
        let (same_token, _) = f.alarms.pending().unwrap();
        assert_eq!(token, same_token);
    }

    #[test]
    fn twilight_boundary_pushes_flip_activation() {
        let mut f = fixture(AutoMode::Twilight, 12, 0);
        f.twilight.set_night(false);
        f.coordinator.attach(USER);
        assert_eq!(f.coordinator.activation(), Activation::Off);

        f.twilight.set_night(true);
        f.coordinator.handle_event(Event::TwilightChanged);
        assert_eq!(f.coordinator.activation(), Activation::On);

        f.twilight.set_night(false);
        f.coordinator.handle_event(Event::TwilightChanged);
        assert_eq!(f.backend.applied(), vec![false, true, false]);
    }

    #[test]
    fn absent_twilight_state_falls_back_to_the_persisted_flag() {
        let mut f = fixture(AutoMode::Twilight, 12, 0);
        f.twilight.set_state(None);
        f.settings.set_activated(true);
        f.coordinator.attach(USER);

        // No night reading to act on, so the persisted flag decides.
        assert_eq!(f.coordinator.activation(), Activation::On);
    }

    #[test]
    fn editing_the_window_start_recomputes() {
        // 20:30 is outside the 22:00 window.
        let mut f = fixture(AutoMode::Custom, 20, 30);
        f.coordinator.attach(USER);
        assert_eq!(f.coordinator.activation(), Activation::Off);

        // Pull the start back to 20:00; now is inside the new window.
        f.settings.set_custom_window(
            LocalTime::new(20, 0).unwrap(),
            LocalTime::new(6, 0).unwrap(),
        );
        f.coordinator
            .handle_event(Event::SettingChanged(SettingKey::CustomStartTime(USER)));

        assert_eq!(f.coordinator.activation(), Activation::On);
        let (_, at) = f.alarms.pending().unwrap();
        assert_eq!(at, Tz::UTC.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap());
    }

    #[test]
    fn other_users_window_edits_are_ignored() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        let (token, _) = f.alarms.pending().unwrap();

        // Another user's table changed on disk; our schedule keeps its
        // alarm, its hysteresis stamp, and its activation.
        f.settings.set_custom_window(
            LocalTime::new(20, 0).unwrap(),
            LocalTime::new(6, 0).unwrap(),
        );
        f.coordinator
            .handle_event(Event::SettingChanged(SettingKey::CustomStartTime(USER + 1)));

        let (same_token, _) = f.alarms.pending().unwrap();
        assert_eq!(token, same_token);
        assert_eq!(f.backend.applied(), vec![true]);
    }

    #[test]
    fn time_change_recomputes_the_custom_window() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        assert_eq!(f.coordinator.activation(), Activation::On);

        // The clock jumped past the window end without the alarm firing.
        f.clock
            .set(Tz::UTC.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap());
        f.coordinator.handle_event(Event::TimeChanged);

        assert_eq!(f.coordinator.activation(), Activation::Off);
        let (_, at) = f.alarms.pending().unwrap();
        assert_eq!(at, Tz::UTC.with_ymd_and_hms(2024, 3, 11, 22, 0, 0).unwrap());
    }

    #[test]
    fn detach_releases_the_mode_and_events_become_inert() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        assert_eq!(f.alarms.pending_count(), 1);

        f.coordinator.detach();
        assert!(!f.coordinator.is_attached());
        assert_eq!(f.alarms.pending_count(), 0);

        f.coordinator.handle_event(Event::TimeChanged);
        assert_eq!(f.backend.applied(), vec![true]);
    }

    #[test]
    fn reattach_replaces_the_previous_session() {
        let mut f = fixture(AutoMode::Custom, 23, 30);
        f.coordinator.attach(USER);
        let first_cancels = f.alarms.cancel_count();

        f.coordinator.attach(USER + 1);
        assert!(f.alarms.cancel_count() > first_cancels);
        assert_eq!(f.alarms.pending_count(), 1);
        assert_eq!(f.coordinator.activation(), Activation::On);
    }

    mockall::mock! {
        Backend {}
        impl TintBackend for Backend {
            fn name(&self) -> &'static str;
            fn apply_night_preset(&mut self) -> Result<()>;
            fn apply_day_preset(&mut self) -> Result<()>;
        }
    }

    #[test]
    fn backend_failures_do_not_derail_the_session() {
        let clock = Arc::new(ManualClock::new(
            Tz::UTC.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap(),
        ));
        let settings = Arc::new(MemorySettingsStore::new(AutoMode::Custom));
        let alarms = Arc::new(RecordingAlarmScheduler::new());
        let twilight = Arc::new(StaticTwilightProvider::new());

        let mut backend = MockBackend::new();
        backend
            .expect_apply_night_preset()
            .times(1)
            .returning(|| Err(anyhow::anyhow!("write failed")));
        backend.expect_name().return_const("mock");

        let mut coordinator = Coordinator::new(
            clock,
            settings,
            alarms.clone(),
            twilight,
            Box::new(backend),
        );
        coordinator.attach(USER);

        // The flip stands and the alarm is scheduled despite the failure.
        assert_eq!(coordinator.activation(), Activation::On);
        assert_eq!(alarms.pending_count(), 1);
    }
}
