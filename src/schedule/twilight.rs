//! Twilight-driven scheduling.
//!
//! The twilight schedule activates the tint while the provider reports
//! night. It holds a provider subscription for the duration of its run and
//! mirrors the provider's boolean into the activation state, requesting a
//! change only when a fresh reading both differs from the last one it saw
//! and disagrees with the current activation. An absent provider state
//! reads as "not night".

use std::sync::Arc;

use crate::state::Activation;
use crate::twilight::{SubscriptionId, TwilightProvider};

use super::Phase;

pub struct TwilightSchedule {
    provider: Arc<dyn TwilightProvider>,
    is_night: bool,
    subscription: Option<SubscriptionId>,
    phase: Phase,
}

impl TwilightSchedule {
    pub fn new(provider: Arc<dyn TwilightProvider>) -> Self {
        Self {
            provider,
            is_night: false,
            subscription: None,
            phase: Phase::Stopped,
        }
    }

    /// Subscribe to boundary pushes and transition to Running. The caller
    /// follows up with a recompute.
    pub fn start(&mut self) {
        self.subscription = Some(self.provider.subscribe());
        self.phase = Phase::Running;
    }

    /// Release the subscription and transition to Stopped. The unsubscribe
    /// happens whenever a subscription is held, regardless of phase.
    pub fn stop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.provider.unsubscribe(id);
        }
        self.phase = Phase::Stopped;
    }

    /// Re-read the provider and decide whether activation should change.
    ///
    /// Returns `Some(active)` when the night reading changed and the new
    /// reading disagrees with the current activation.
    pub fn recompute(&mut self, current: Activation) -> Option<bool> {
        if self.phase != Phase::Running {
            return None;
        }
        let is_night = self
            .provider
            .current_state()
            .map(|state| state.is_night())
            .unwrap_or(false);
        if is_night == self.is_night {
            return None;
        }
        self.is_night = is_night;
        if current.as_bool() != Some(is_night) {
            Some(is_night)
        } else {
            None
        }
    }

    /// The night reading as of the last recompute.
    pub fn is_night(&self) -> bool {
        self.is_night
    }
}
