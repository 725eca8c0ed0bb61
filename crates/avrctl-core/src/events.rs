//! Asynchronous receiver event types.
//!
//! Events are emitted by the controller through a
//! `tokio::sync::broadcast` channel whenever a decoded status line changes
//! cached device state. Accessory and presentation layers subscribe to
//! these for push-style updates instead of re-reading state on a timer.

use crate::types::Zone;

/// An event emitted when receiver state changes.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under load. The cached device
/// state remains the source of truth — events signal *that* something
/// changed, and carry the new value for convenience.
#[derive(Debug, Clone, PartialEq)]
pub enum AvrEvent {
    /// A zone's power state changed.
    PowerChanged {
        /// Which zone changed.
        zone: Zone,
        /// `true` if the zone is now on.
        on: bool,
    },

    /// A zone's mute state changed.
    MuteChanged {
        /// Which zone changed.
        zone: Zone,
        /// `true` if the zone is now muted.
        on: bool,
    },

    /// A zone's volume changed.
    VolumeChanged {
        /// Which zone changed.
        zone: Zone,
        /// New volume in real units (tenths already descaled).
        level: f64,
    },

    /// The receiver reported its configured volume ceiling.
    MaxVolumeChanged {
        /// New ceiling in main-zone units.
        level: f64,
    },

    /// A zone's input source changed.
    InputChanged {
        /// Which zone changed.
        zone: Zone,
        /// Wire id of the newly selected source (e.g. `"CD"`).
        input: String,
    },

    /// Successfully connected to the receiver.
    Connected,

    /// The connection to the receiver was lost or closed.
    Disconnected,
}
