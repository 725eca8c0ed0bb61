//! Command table, decoders, and command builders.
//!
//! The control protocol addresses status categories with short codes
//! (`PW` power, `MV` volume, `SI` source, `MU` mute, `Z2`/`Z3` zone
//! compounds). This module owns the static registry of those codes, the
//! prefix matcher that routes inbound status lines, the decoders that turn
//! payloads into state updates, and the builders that produce outbound
//! command lines.
//!
//! # Decoder dispatch
//!
//! Decoders are a closed set, represented by the [`Decoder`] enum and
//! dispatched through the single [`decode`] interpreter. The registry is a
//! process-wide constant; nothing here performs I/O or holds state.
//!
//! # Prefix matching
//!
//! Status lines carry no delimiter between code and payload, and some
//! codes are prefixes of others (`Z2` vs `Z2MV`). [`resolve`] therefore
//! picks the *longest* registered code that prefixes the line, which makes
//! routing deterministic regardless of registry order.

use avrctl_core::types::{is_known_input, Zone};

use crate::state::Value;

/// How a matched line's payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// Store the trimmed payload verbatim.
    Generic,
    /// Numeric volume with tenths scaling and the `MAX` ceiling sentinel.
    Volume,
    /// Zone compound: the payload is a nested power/volume/source reading.
    Zone(Zone),
}

/// One registered command code.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Wire code, also the device-state key.
    pub code: &'static str,
    /// Human label for logging.
    pub label: &'static str,
    /// Payload decoder.
    pub decoder: Decoder,
}

/// The command registry.
///
/// Every code listed here is queried by a refresh cycle and owns exactly
/// one entry in the device state. The zone-nested codes (`Z2MV`, `Z2MU`,
/// `Z2SI`, ...) are listed so that directly-prefixed status lines route to
/// them; the bare `Z2`/`Z3` compounds re-dispatch into the same keys.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec { code: "PW", label: "Power", decoder: Decoder::Generic },
    CommandSpec { code: "ZM", label: "Main Zone", decoder: Decoder::Generic },
    CommandSpec { code: "Z2", label: "Zone 2", decoder: Decoder::Zone(Zone::Zone2) },
    CommandSpec { code: "Z3", label: "Zone 3", decoder: Decoder::Zone(Zone::Zone3) },
    CommandSpec { code: "MU", label: "Muted", decoder: Decoder::Generic },
    CommandSpec { code: "Z2MU", label: "Zone 2 Muted", decoder: Decoder::Generic },
    CommandSpec { code: "Z3MU", label: "Zone 3 Muted", decoder: Decoder::Generic },
    CommandSpec { code: "MV", label: "Volume", decoder: Decoder::Volume },
    CommandSpec { code: "Z2MV", label: "Zone 2 Volume", decoder: Decoder::Volume },
    CommandSpec { code: "Z3MV", label: "Zone 3 Volume", decoder: Decoder::Volume },
    CommandSpec { code: "SI", label: "Source", decoder: Decoder::Generic },
    CommandSpec { code: "Z2SI", label: "Zone 2 Source", decoder: Decoder::Generic },
    CommandSpec { code: "Z3SI", label: "Zone 3 Source", decoder: Decoder::Generic },
];

/// A decoded state mutation produced by [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Store `value` under `code`.
    Set {
        /// Device-state key (a registered command code).
        code: &'static str,
        /// The decoded value.
        value: Value,
    },
    /// The receiver reported its volume ceiling.
    MaxVolume(f64),
    /// The payload matched no known shape; drop it silently.
    Skip,
}

/// Match an inbound status line against the command registry.
///
/// Tests every registered code as a literal prefix of the line and picks
/// the longest match; returns the matched spec and the remaining payload.
/// Returns `None` for lines whose prefix matches no registered code --
/// such lines are dropped without error.
pub fn resolve(line: &str) -> Option<(&'static CommandSpec, &str)> {
    resolve_in(COMMANDS, line)
}

/// [`resolve`] against an explicit table. Split out so tests can prove the
/// result does not depend on registry order.
fn resolve_in<'t, 'l>(table: &'t [CommandSpec], line: &'l str) -> Option<(&'t CommandSpec, &'l str)> {
    table
        .iter()
        .filter(|spec| line.starts_with(spec.code))
        .max_by_key(|spec| spec.code.len())
        .map(|spec| (spec, &line[spec.code.len()..]))
}

/// Decode a matched payload into a state update.
///
/// This is the single interpreter for all [`Decoder`] variants. Payloads
/// that fit no known shape yield [`StateUpdate::Skip`] -- the wire
/// protocol has no schema, so best-effort is the contract.
pub fn decode(spec: &CommandSpec, payload: &str) -> StateUpdate {
    match spec.decoder {
        Decoder::Generic => {
            let trimmed = payload.trim();
            if trimmed.is_empty() {
                StateUpdate::Skip
            } else {
                StateUpdate::Set {
                    code: spec.code,
                    value: Value::Str(trimmed.to_string()),
                }
            }
        }
        Decoder::Volume => match parse_volume(payload) {
            Some(VolumeReading::Level(level)) => StateUpdate::Set {
                code: spec.code,
                value: Value::Num(level),
            },
            Some(VolumeReading::Max(level)) => StateUpdate::MaxVolume(level),
            None => StateUpdate::Skip,
        },
        Decoder::Zone(zone) => decode_zone(zone, payload.trim()),
    }
}

/// A parsed volume payload.
#[derive(Debug, Clone, Copy, PartialEq)]
enum VolumeReading {
    /// Current level in real units.
    Level(f64),
    /// The configured ceiling (the `MAX`-prefixed variant).
    Max(f64),
}

/// Parse a volume payload: either bare digits or `MAX` followed by digits.
///
/// The digit run is trimmed before the length rule is applied, so
/// `"MAX 86"` reads as a ceiling of 86, not 8.6.
fn parse_volume(payload: &str) -> Option<VolumeReading> {
    let trimmed = payload.trim();
    match trimmed.strip_prefix("MAX") {
        Some(rest) => parse_wire_number(rest.trim()).map(VolumeReading::Max),
        None => parse_wire_number(trimmed).map(VolumeReading::Level),
    }
}

/// Parse the protocol's numeric encoding.
///
/// A 2-digit token is whole units; 3 or more digits carry one implied
/// decimal place (`"505"` is 50.5). Anything containing a non-digit is not
/// a number.
pub(crate) fn parse_wire_number(digits: &str) -> Option<f64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    if digits.len() > 2 {
        Some(f64::from(value) / 10.0)
    } else {
        Some(f64::from(value))
    }
}

/// Decode a zone-compound payload (the wrapper has already stripped the
/// zone tag from the line).
///
/// Classification order: power (`ON`/`OFF` exactly), then numeric volume,
/// then a known source-input id. Anything else is dropped.
fn decode_zone(zone: Zone, payload: &str) -> StateUpdate {
    if payload == "ON" || payload == "OFF" {
        return StateUpdate::Set {
            code: zone.power_code(),
            value: Value::Str(payload.to_string()),
        };
    }

    if let Some(level) = parse_wire_number(payload) {
        return StateUpdate::Set {
            code: zone.volume_code(),
            value: Value::Num(level),
        };
    }

    if is_known_input(payload) {
        return StateUpdate::Set {
            code: zone.source_code(),
            value: Value::Str(payload.to_string()),
        };
    }

    StateUpdate::Skip
}

// ---------------------------------------------------------------
// Outbound command builders
// ---------------------------------------------------------------

/// Build a status query for a command code (`PW` -> `PW?`).
pub fn cmd_query(code: &str) -> String {
    format!("{code}?")
}

/// Build a power set command.
///
/// Main zone uses the irregular write encoding: on is `PWON` but off is
/// `PWSTANDBY` (the unit *reports* the off state as `OFF`, and `PWOFF` is
/// not a valid command). Other zones use their tag with `ON`/`OFF`.
pub fn cmd_set_power(zone: Zone, on: bool) -> String {
    match zone {
        Zone::Main => format!("PW{}", if on { "ON" } else { "STANDBY" }),
        other => format!("{}{}", other.prefix(), if on { "ON" } else { "OFF" }),
    }
}

/// Build a mute set command (`MUON`, `Z2MUOFF`, ...).
pub fn cmd_set_mute(zone: Zone, on: bool) -> String {
    format!("{}{}", zone.mute_code(), if on { "ON" } else { "OFF" })
}

/// Build a source-select command.
///
/// Main zone selects through the `SI` code (`SICD`); the other zones
/// select through their bare tag (`Z2CD`), mirroring how the unit reports
/// the selection back.
pub fn cmd_set_input(zone: Zone, input_id: &str) -> String {
    match zone {
        Zone::Main => format!("SI{input_id}"),
        other => format!("{}{}", other.prefix(), input_id),
    }
}

/// Build the compound volume set command.
///
/// The level is clamped to `[0, max_volume]` and snapped to the protocol's
/// 0.5-step grid. The unit only honors a volume set when the `MVMAX` line
/// accompanies it, so both lines go out in a single write:
/// `<prefix>MV<value>\r<prefix>MVMAX <max>`.
pub fn cmd_set_volume(zone: Zone, level: f64, max_volume: f64) -> String {
    let clamped = level.clamp(0.0, max_volume);
    let prefix = zone.prefix();
    format!(
        "{prefix}MV{}\r{prefix}MVMAX {}",
        format_volume(clamped),
        max_volume
    )
}

/// Round a level to the nearest 0.5 step, ties away from zero.
pub fn round_to_half(level: f64) -> f64 {
    (level * 2.0).round() / 2.0
}

/// Encode a level in the wire's numeric form.
///
/// Whole units are two zero-padded digits (`5.0` -> `"05"`); half steps
/// are three digits carrying the implied decimal (`50.5` -> `"505"`).
pub fn format_volume(level: f64) -> String {
    let snapped = round_to_half(level.max(0.0));
    let tenths = (snapped * 10.0).round() as u32;
    if tenths % 10 == 0 {
        format!("{:02}", tenths / 10)
    } else {
        format!("{:03}", tenths)
    }
}
