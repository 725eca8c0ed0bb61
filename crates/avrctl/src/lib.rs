//! # avrctl -- Network Control for Denon/Marantz AV Receivers
//!
//! `avrctl` is an asynchronous Rust library for controlling Denon and
//! Marantz AV receivers over their telnet-style TCP control protocol. It
//! is designed for home-automation bridges and control panels that need
//! reliable power, volume, mute, and input-source control per zone.
//!
//! ## Quick Start
//!
//! Add `avrctl` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! avrctl = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a receiver and read its state:
//!
//! ```no_run
//! use avrctl::{AvrBuilder, Zone};
//!
//! #[tokio::main]
//! async fn main() -> avrctl::Result<()> {
//!     let controller = AvrBuilder::new("192.168.1.40").build().await?;
//!
//!     // The connect-time refresh fills the cache as answers arrive.
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!
//!     println!("power: {}", controller.get_power_state(Zone::Main).await);
//!     if let Some(volume) = controller.get_volume(Zone::Main).await {
//!         println!("volume: {volume}");
//!     }
//!
//!     controller.set_volume(Zone::Main, 45.0).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## How it works
//!
//! The receiver speaks free-text status lines (`PWON`, `MV505`, `Z2CD`)
//! over one persistent TCP connection, answering queries asynchronously
//! and pushing unsolicited updates in between. `avrctl` therefore never
//! correlates a response with a request: a background IO task decodes
//! every inbound line into a state cache, and the typed getters read that
//! cache with zero latency. Setters write a command and complete; the
//! cache follows once the unit echoes the change. State changes are also
//! published on a broadcast channel -- see
//! [`AvrController::subscribe`].
//!
//! Outbound writes are paced (the unit drops back-to-back commands), the
//! volume encoding's tenths scaling and `MAX` ceiling sentinel are handled
//! in the decoders, and zone-compound lines (`Z2ON`, `Z240`, `Z2CD`) are
//! re-dispatched to the right per-zone state slots.
//!
//! ## Workspace
//!
//! - `avrctl` (this crate) -- controller, command table, decoders, state
//! - `avrctl-core` -- shared traits, types, errors, events
//! - `avrctl-transport` -- the telnet-style TCP transport
//! - `avrctl-test-harness` -- mock transport and scripted mock receiver

pub mod builder;
pub mod commands;
pub mod controller;
pub(crate) mod io;
pub mod protocol;
pub mod state;

pub use builder::AvrBuilder;
pub use controller::{AvrController, PollHandle};
pub use state::{Value, DEFAULT_MAX_VOLUME};

// Re-export the core vocabulary so applications only need `avrctl`.
pub use avrctl_core::error::{Error, Result};
pub use avrctl_core::events::AvrEvent;
pub use avrctl_core::transport::Transport;
pub use avrctl_core::types::{find_input, is_known_input, Input, Zone, INPUTS};
