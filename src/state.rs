//! Activation state of the display tint.

use chrono::DateTime;
use chrono_tz::Tz;

/// Tri-state activation flag.
///
/// `Unknown` only exists before the first determination of a session; once
/// determined, the state flips between `On` and `Off` and never reverts to
/// `Unknown` while the session is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Unknown,
    On,
    Off,
}

impl Activation {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Activation::Unknown => None,
            Activation::On => Some(true),
            Activation::Off => Some(false),
        }
    }
}

impl From<bool> for Activation {
    fn from(active: bool) -> Self {
        if active {
            Activation::On
        } else {
            Activation::Off
        }
    }
}

/// Activation flag plus the instant of its last transition.
///
/// Mutated only by the coordinator.
#[derive(Debug, Clone)]
pub struct ActivationState {
    value: Activation,
    last_transition: Option<DateTime<Tz>>,
}

impl ActivationState {
    pub fn new() -> Self {
        Self {
            value: Activation::Unknown,
            last_transition: None,
        }
    }

    pub fn value(&self) -> Activation {
        self.value
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    pub fn last_transition(&self) -> Option<&DateTime<Tz>> {
        self.last_transition.as_ref()
    }

    pub fn set(&mut self, active: bool, at: DateTime<Tz>) {
        self.value = Activation::from(active);
        self.last_transition = Some(at);
    }
}

impl Default for ActivationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn starts_unknown_with_no_transition() {
        let state = ActivationState::new();
        assert_eq!(state.value(), Activation::Unknown);
        assert!(state.as_bool().is_none());
        assert!(state.last_transition().is_none());
    }

    #[test]
    fn set_records_value_and_instant() {
        let mut state = ActivationState::new();
        let at = chrono_tz::Tz::UTC.with_ymd_and_hms(2024, 3, 10, 22, 0, 0).unwrap();
        state.set(true, at);
        assert_eq!(state.value(), Activation::On);
        assert_eq!(state.as_bool(), Some(true));
        assert_eq!(state.last_transition(), Some(&at));

        state.set(false, at);
        assert_eq!(state.value(), Activation::Off);
    }
}
