//! avrctl-test-harness: Mock transports and a scripted mock receiver for
//! avrctl.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the protocol engine without real hardware, and [`MockAvrServer`] for
//! end-to-end testing of the controller over an actual TCP connection.

pub mod mock_server;
pub mod mock_transport;

pub use mock_server::MockAvrServer;
pub use mock_transport::{MockHandle, MockTransport};
