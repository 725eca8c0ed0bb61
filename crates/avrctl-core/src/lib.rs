//! avrctl-core: Core traits, types, and error definitions for avrctl.
//!
//! This crate defines the transport-agnostic abstractions the rest of the
//! workspace builds on. Applications normally depend on the `avrctl` crate
//! and only touch these types through its re-exports.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the receiver
//! - [`Zone`] / [`Input`] -- zone addressing and the source catalog
//! - [`AvrEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use avrctl_core::*`.
pub use error::{Error, Result};
pub use events::AvrEvent;
pub use transport::Transport;
pub use types::{find_input, is_known_input, Input, ParseZoneError, Zone, INPUTS};
