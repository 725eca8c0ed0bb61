//! Cached receiver state decoded from status lines.
//!
//! The receiver pushes status asynchronously and answers queries out of
//! order, so the controller never correlates a response with a request.
//! Instead every decoded line is merged into this cache, last write wins,
//! and the typed getters read whatever is current. A value stays at the
//! unknown sentinel until the first status line for its code arrives.
//!
//! `DeviceState` itself is plain data; the controller guards it with a
//! mutex and the IO task is its only writer.

use std::collections::HashMap;
use std::fmt;

use avrctl_core::events::AvrEvent;
use avrctl_core::types::Zone;

use crate::commands::{StateUpdate, COMMANDS};

/// Default volume ceiling before the unit reports its own (`MVMAX`).
pub const DEFAULT_MAX_VOLUME: f64 = 98.0;

/// A cached value for one command code.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No status line has ever been decoded for this code.
    #[default]
    Unknown,
    /// A verbatim string payload (`"ON"`, `"STANDBY"`, `"CD"`, ...).
    Str(String),
    /// A decoded number in real units (volume, tenths already descaled).
    Num(f64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => f.write_str("-"),
            Value::Str(s) => f.write_str(s),
            Value::Num(n) => write!(f, "{n}"),
        }
    }
}

const UNKNOWN: Value = Value::Unknown;

/// The per-controller state cache: one slot per registered command code,
/// plus the learned volume ceiling.
#[derive(Debug)]
pub struct DeviceState {
    values: HashMap<&'static str, Value>,
    max_volume: f64,
}

impl DeviceState {
    /// Create a cache with every registered code at the unknown sentinel.
    pub fn new() -> Self {
        let values = COMMANDS
            .iter()
            .map(|spec| (spec.code, Value::Unknown))
            .collect();
        DeviceState {
            values,
            max_volume: DEFAULT_MAX_VOLUME,
        }
    }

    /// Read the value stored under a command code.
    ///
    /// Unregistered codes read as [`Value::Unknown`].
    pub fn value(&self, code: &str) -> &Value {
        self.values.get(code).unwrap_or(&UNKNOWN)
    }

    /// Read a boolean-encoded value: `"ON"` is true, anything else
    /// (including `OFF`, `STANDBY`, and the unknown sentinel) is false.
    pub fn bool_value(&self, code: &str) -> bool {
        matches!(self.value(code), Value::Str(s) if s == "ON")
    }

    /// Read a numeric value. Strings and the unknown sentinel read as `None`.
    pub fn num_value(&self, code: &str) -> Option<f64> {
        match self.value(code) {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Read a string value. Numbers and the unknown sentinel read as `None`.
    pub fn str_value(&self, code: &str) -> Option<&str> {
        match self.value(code) {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The volume ceiling used to clamp outbound volume sets.
    pub fn max_volume(&self) -> f64 {
        self.max_volume
    }

    /// Merge one decoded update into the cache.
    ///
    /// Returns the change event to broadcast, or `None` when the update
    /// was a skip, targeted an unregistered code, or left the stored value
    /// unchanged (re-polling the same status must not re-announce it).
    pub fn apply(&mut self, update: StateUpdate) -> Option<AvrEvent> {
        match update {
            StateUpdate::Skip => None,
            StateUpdate::MaxVolume(level) => {
                if self.max_volume == level {
                    return None;
                }
                self.max_volume = level;
                Some(AvrEvent::MaxVolumeChanged { level })
            }
            StateUpdate::Set { code, value } => {
                let slot = self.values.get_mut(code)?;
                if *slot == value {
                    return None;
                }
                *slot = value.clone();
                event_for(code, &value)
            }
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a changed code/value pair to its broadcast event.
///
/// `ZM` is cached but not announced: main power is the `PW` code's
/// business and double-announcing it would make subscribers flap.
fn event_for(code: &str, value: &Value) -> Option<AvrEvent> {
    let on = matches!(value, Value::Str(s) if s == "ON");
    match code {
        "PW" => Some(AvrEvent::PowerChanged { zone: Zone::Main, on }),
        "Z2" => Some(AvrEvent::PowerChanged { zone: Zone::Zone2, on }),
        "Z3" => Some(AvrEvent::PowerChanged { zone: Zone::Zone3, on }),
        "MU" => Some(AvrEvent::MuteChanged { zone: Zone::Main, on }),
        "Z2MU" => Some(AvrEvent::MuteChanged { zone: Zone::Zone2, on }),
        "Z3MU" => Some(AvrEvent::MuteChanged { zone: Zone::Zone3, on }),
        "MV" | "Z2MV" | "Z3MV" => {
            let zone = match code {
                "MV" => Zone::Main,
                "Z2MV" => Zone::Zone2,
                _ => Zone::Zone3,
            };
            match value {
                Value::Num(level) => Some(AvrEvent::VolumeChanged { zone, level: *level }),
                _ => None,
            }
        }
        "SI" | "Z2SI" | "Z3SI" => {
            let zone = match code {
                "SI" => Zone::Main,
                "Z2SI" => Zone::Zone2,
                _ => Zone::Zone3,
            };
            match value {
                Value::Str(input) => Some(AvrEvent::InputChanged {
                    zone,
                    input: input.clone(),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_all_unknown() {
        let state = DeviceState::new();
        for spec in COMMANDS {
            assert_eq!(state.value(spec.code), &Value::Unknown, "{}", spec.code);
        }
        assert_eq!(state.max_volume(), DEFAULT_MAX_VOLUME);
    }

    #[test]
    fn unknown_sentinel_displays_as_dash() {
        assert_eq!(Value::Unknown.to_string(), "-");
        assert_eq!(Value::Str("ON".into()).to_string(), "ON");
        assert_eq!(Value::Num(50.5).to_string(), "50.5");
        assert_eq!(Value::Num(50.0).to_string(), "50");
    }

    #[test]
    fn apply_set_stores_and_announces() {
        let mut state = DeviceState::new();
        let event = state.apply(StateUpdate::Set {
            code: "PW",
            value: Value::Str("ON".into()),
        });
        assert_eq!(
            event,
            Some(AvrEvent::PowerChanged { zone: Zone::Main, on: true })
        );
        assert!(state.bool_value("PW"));
    }

    #[test]
    fn apply_same_value_twice_announces_once() {
        let mut state = DeviceState::new();
        let update = StateUpdate::Set {
            code: "MV",
            value: Value::Num(50.5),
        };
        assert!(state.apply(update.clone()).is_some());
        // The poll cycle re-reports unchanged status constantly.
        assert!(state.apply(update).is_none());
        assert_eq!(state.num_value("MV"), Some(50.5));
    }

    #[test]
    fn apply_unregistered_code_is_ignored() {
        let mut state = DeviceState::new();
        let event = state.apply(StateUpdate::Set {
            code: "Z4MV",
            value: Value::Num(10.0),
        });
        assert!(event.is_none());
        assert_eq!(state.value("Z4MV"), &Value::Unknown);
    }

    #[test]
    fn apply_max_volume_updates_ceiling() {
        let mut state = DeviceState::new();
        let event = state.apply(StateUpdate::MaxVolume(86.0));
        assert_eq!(event, Some(AvrEvent::MaxVolumeChanged { level: 86.0 }));
        assert_eq!(state.max_volume(), 86.0);
        // Current volume is untouched by the ceiling report.
        assert_eq!(state.num_value("MV"), None);
    }

    #[test]
    fn apply_skip_changes_nothing() {
        let mut state = DeviceState::new();
        assert!(state.apply(StateUpdate::Skip).is_none());
    }

    #[test]
    fn bool_value_semantics() {
        let mut state = DeviceState::new();
        assert!(!state.bool_value("PW")); // unknown reads as off

        state.apply(StateUpdate::Set { code: "PW", value: Value::Str("ON".into()) });
        assert!(state.bool_value("PW"));

        state.apply(StateUpdate::Set { code: "PW", value: Value::Str("STANDBY".into()) });
        assert!(!state.bool_value("PW"));

        state.apply(StateUpdate::Set { code: "PW", value: Value::Str("OFF".into()) });
        assert!(!state.bool_value("PW"));
    }

    #[test]
    fn mute_and_input_events() {
        let mut state = DeviceState::new();
        assert_eq!(
            state.apply(StateUpdate::Set { code: "Z2MU", value: Value::Str("ON".into()) }),
            Some(AvrEvent::MuteChanged { zone: Zone::Zone2, on: true })
        );
        assert_eq!(
            state.apply(StateUpdate::Set { code: "Z2SI", value: Value::Str("CD".into()) }),
            Some(AvrEvent::InputChanged { zone: Zone::Zone2, input: "CD".into() })
        );
    }

    #[test]
    fn zm_is_cached_but_not_announced() {
        let mut state = DeviceState::new();
        let event = state.apply(StateUpdate::Set {
            code: "ZM",
            value: Value::Str("ON".into()),
        });
        assert!(event.is_none());
        assert!(state.bool_value("ZM"));
    }
}
