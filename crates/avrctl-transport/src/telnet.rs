//! Telnet-style TCP transport for receiver communication.
//!
//! This module provides [`TelnetTransport`], which implements the
//! [`Transport`] trait for the network control port that Denon and Marantz
//! receivers expose. The "telnet" in the name is historical: the receiver
//! speaks raw carriage-return-delimited ASCII on TCP port 23 and performs
//! no telnet option negotiation.
//!
//! Receivers accept a single control connection at a time, so one
//! transport instance maps to one physical unit. The default connect
//! timeout is deliberately short -- a unit in deep standby simply does not
//! answer, and a hung connect would stall every zone accessory behind it.
//!
//! # Example
//!
//! ```no_run
//! use avrctl_transport::TelnetTransport;
//! use avrctl_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> avrctl_core::Result<()> {
//! // Connect to the receiver's control port (23 is implied).
//! let mut transport = TelnetTransport::connect("192.168.1.40").await?;
//!
//! // Query main-zone power.
//! transport.send(b"PW?\r\n").await?;
//!
//! // Read whatever status lines come back.
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_millis(500)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use avrctl_core::error::{Error, Result};
use avrctl_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP port of the receiver's network control interface.
pub const CONTROL_PORT: u16 = 23;

/// Default connection timeout (1.5 seconds).
///
/// Matches the receiver's observed behavior: a reachable unit answers the
/// SYN well inside a second; anything slower is off, unplugged, or already
/// owned by another controller.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Telnet-style TCP transport to an AV receiver.
///
/// Implements the [`Transport`] trait. The connection is established
/// eagerly via [`connect`](TelnetTransport::connect) or
/// [`connect_with_timeout`](TelnetTransport::connect_with_timeout).
#[derive(Debug)]
pub struct TelnetTransport {
    /// The underlying TCP stream, `None` after `close()` is called.
    stream: Option<TcpStream>,
    /// The address string for logging/debugging.
    addr: String,
}

impl TelnetTransport {
    /// Connect to a receiver using the default timeout.
    ///
    /// `host` may be a bare hostname/IP (`"192.168.1.40"`), in which case
    /// the standard control port 23 is used, or an explicit `host:port`
    /// pair.
    pub async fn connect(host: &str) -> Result<Self> {
        Self::connect_with_timeout(host, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a receiver with a specified timeout.
    ///
    /// # Arguments
    ///
    /// * `host` - A bare host (port 23 implied) or a `host:port` string
    /// * `timeout` - Maximum time to wait for the connection
    pub async fn connect_with_timeout(host: &str, timeout: Duration) -> Result<Self> {
        let addr = if host.contains(':') {
            host.to_string()
        } else {
            format!("{host}:{CONTROL_PORT}")
        };

        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to receiver control port"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "receiver connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "receiver connection failed");
                map_connect_error(e, &addr)
            })?;

        // Disable Nagle's algorithm; control commands are tiny and the
        // receiver drops frames when paced writes arrive coalesced.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "receiver control connection established");

        Ok(Self {
            stream: Some(stream),
            addr,
        })
    }

    /// Wrap an existing `TcpStream` as a `TelnetTransport`.
    ///
    /// Useful when a TCP connection has already been established
    /// externally (e.g. accepted from a listener in tests).
    ///
    /// # Arguments
    ///
    /// * `stream` - An already-connected `TcpStream`
    /// * `addr` - A label for logging (typically the peer address)
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        tracing::debug!(addr = %addr, "Wrapping existing TCP stream");
        Self {
            stream: Some(stream),
            addr,
        }
    }

    /// Get the address string this transport was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?data,
            "Sending command data"
        );

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
            map_io_error(e)
        })?;

        stream.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let result = tokio::time::timeout(timeout, stream.read(buf)).await;

        match result {
            Ok(Ok(0)) => {
                // TCP: 0 bytes read means the receiver closed the connection.
                tracing::warn!(addr = %self.addr, "receiver closed connection (0 bytes read)");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(
                    addr = %self.addr,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received status data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(addr = %self.addr, "Closing receiver connection");

            if let Err(e) = stream.flush().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }

            tracing::info!(addr = %self.addr, "receiver connection closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TelnetTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(addr = %self.addr, "TelnetTransport dropped, closing connection");
            // The stream is closed when dropped.
        }
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
