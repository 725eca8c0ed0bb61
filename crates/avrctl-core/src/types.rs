//! Zone addressing and the source-input catalog.
//!
//! Denon/Marantz receivers expose up to four independently controllable
//! audio zones. On the wire, the main zone is unprefixed (volume is `MV`,
//! mute is `MU`, source is `SI`) while the other zones prepend their tag
//! (`Z2MV`, `Z2MU`, ...), except that zone power and compound zone status
//! use the bare tag itself (`Z2ON`, `Z2CD`, `Z240`).
//!
//! [`Zone`] owns that irregular mapping so the rest of the library can ask
//! for "the volume code of zone 2" without string concatenation at call
//! sites.

use std::fmt;
use std::str::FromStr;

/// An independently controllable audio output region of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    /// The main listening zone.
    Main,
    /// Zone 2.
    Zone2,
    /// Zone 3.
    Zone3,
    /// Zone 4 (rare; addressable for set commands but not polled).
    Zone4,
}

impl Zone {
    /// All zones, in wire-protocol order.
    pub const ALL: [Zone; 4] = [Zone::Main, Zone::Zone2, Zone::Zone3, Zone::Zone4];

    /// The command-code prefix for this zone (`""` for main).
    pub fn prefix(&self) -> &'static str {
        match self {
            Zone::Main => "",
            Zone::Zone2 => "Z2",
            Zone::Zone3 => "Z3",
            Zone::Zone4 => "Z4",
        }
    }

    /// The code under which this zone's power state is reported.
    ///
    /// Main zone power is the `PW` command; the other zones report power
    /// as a bare `ON`/`OFF` payload on their own tag.
    pub fn power_code(&self) -> &'static str {
        match self {
            Zone::Main => "PW",
            Zone::Zone2 => "Z2",
            Zone::Zone3 => "Z3",
            Zone::Zone4 => "Z4",
        }
    }

    /// The code under which this zone's volume is stored (`<prefix>MV`).
    pub fn volume_code(&self) -> &'static str {
        match self {
            Zone::Main => "MV",
            Zone::Zone2 => "Z2MV",
            Zone::Zone3 => "Z3MV",
            Zone::Zone4 => "Z4MV",
        }
    }

    /// The code under which this zone's mute state is stored (`<prefix>MU`).
    pub fn mute_code(&self) -> &'static str {
        match self {
            Zone::Main => "MU",
            Zone::Zone2 => "Z2MU",
            Zone::Zone3 => "Z3MU",
            Zone::Zone4 => "Z4MU",
        }
    }

    /// The code under which this zone's input source is stored (`<prefix>SI`).
    pub fn source_code(&self) -> &'static str {
        match self {
            Zone::Main => "SI",
            Zone::Zone2 => "Z2SI",
            Zone::Zone3 => "Z3SI",
            Zone::Zone4 => "Z4SI",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zone::Main => "main",
            Zone::Zone2 => "zone2",
            Zone::Zone3 => "zone3",
            Zone::Zone4 => "zone4",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an unknown zone name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseZoneError(pub String);

impl fmt::Display for ParseZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown zone: {}", self.0)
    }
}

impl std::error::Error for ParseZoneError {}

impl FromStr for Zone {
    type Err = ParseZoneError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "main" => Ok(Zone::Main),
            "zone2" => Ok(Zone::Zone2),
            "zone3" => Ok(Zone::Zone3),
            "zone4" => Ok(Zone::Zone4),
            other => Err(ParseZoneError(other.to_string())),
        }
    }
}

/// A named, device-defined source input selectable per zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    /// Wire-protocol source id (e.g. `"SAT/CBL"`).
    pub id: &'static str,
    /// Human-readable label for presentation.
    pub label: &'static str,
}

/// The catalog of known source-input codes.
///
/// These are the ids the receiver reports in `SI` / zone status responses
/// and accepts in source-select commands. The list is reference data: it
/// is never mutated and is shared by every controller instance.
pub const INPUTS: &[Input] = &[
    Input { id: "PHONO", label: "Phono" },
    Input { id: "CD", label: "CD" },
    Input { id: "DVD", label: "DVD" },
    Input { id: "BD", label: "Blu-ray" },
    Input { id: "TV", label: "TV Audio" },
    Input { id: "SAT/CBL", label: "Cable/Satellite" },
    Input { id: "MPLAY", label: "Media Player" },
    Input { id: "GAME", label: "Game" },
    Input { id: "TUNER", label: "Tuner" },
    Input { id: "AUX1", label: "AUX 1" },
    Input { id: "AUX2", label: "AUX 2" },
    Input { id: "NET", label: "Network" },
    Input { id: "BT", label: "Bluetooth" },
    Input { id: "USB/IPOD", label: "USB/iPod" },
];

/// Look up an input by its wire id. Exact, case-sensitive.
pub fn find_input(id: &str) -> Option<&'static Input> {
    INPUTS.iter().find(|input| input.id == id)
}

/// Returns `true` if `id` is a known source-input code.
pub fn is_known_input(id: &str) -> bool {
    find_input(id).is_some()
}
