//! Transport trait for receiver communication.
//!
//! The [`Transport`] trait abstracts over the link to an AV receiver. The
//! production implementation is the telnet-style TCP transport in
//! `avrctl-transport`; deterministic tests use the mock transport from
//! `avrctl-test-harness`.
//!
//! The protocol engine (command encoding, line splitting, state decoding)
//! operates on a `Transport` rather than directly on a socket, so the same
//! code path is exercised against real hardware and scripted mocks.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a receiver.
///
/// Implementations handle connection state and buffering at the socket
/// layer. Protocol concerns (command framing, carriage-return line
/// discipline, status decoding) live above this trait.
///
/// The transport does not retry on its own: when the link drops, deciding
/// whether and when to reconnect is the owning controller's business.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the receiver.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying socket.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the receiver into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout`
    /// for data to arrive and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing showed
    /// up; the caller treats that as "no status traffic right now", not as
    /// a failure.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After `close()`, subsequent `send()` and `receive()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
