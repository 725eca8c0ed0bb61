//! avrctl-transport: Network transport implementation for avrctl.
//!
//! Denon and Marantz receivers expose a line-oriented control protocol on
//! TCP port 23. [`TelnetTransport`] implements the
//! [`Transport`](avrctl_core::Transport) trait for that link; everything
//! above the byte level (framing, command encoding, status decoding) lives
//! in the `avrctl` crate.

pub mod telnet;

pub use telnet::{TelnetTransport, CONTROL_PORT};
