//! AvrBuilder -- fluent builder for constructing [`AvrController`] instances.
//!
//! Separates configuration from connection so callers can set timeouts and
//! pacing before the socket is dialed.
//!
//! # Example
//!
//! ```no_run
//! use avrctl::AvrBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> avrctl::Result<()> {
//! let controller = AvrBuilder::new("192.168.1.40")
//!     .connect_timeout(Duration::from_secs(2))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use avrctl_core::error::Result;
use avrctl_core::transport::Transport;
use avrctl_transport::{TelnetTransport, CONTROL_PORT};

use crate::controller::{AvrController, ControllerOptions};

/// Default connect timeout; matches the transport's own default.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default spacing between consecutive outbound writes.
///
/// The unit silently drops commands that arrive with no gap; 50 ms is the
/// spacing the vendor's own control apps use.
const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(50);

/// Default capacity of the event broadcast channel.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Fluent builder for [`AvrController`].
///
/// All configuration has sensible defaults, so the simplest usage is:
///
/// ```ignore
/// let controller = AvrBuilder::new("192.168.1.40").build().await?;
/// ```
pub struct AvrBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    send_delay: Duration,
    event_capacity: usize,
}

impl AvrBuilder {
    /// Create a builder for the receiver at `host`.
    ///
    /// `host` may be a bare hostname/IP (the control port 23 is implied)
    /// or an explicit `host:port` pair.
    pub fn new(host: &str) -> Self {
        AvrBuilder {
            host: host.to_string(),
            port: CONTROL_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_delay: DEFAULT_SEND_DELAY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Override the control port (default: 23).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection timeout (default: 1.5 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the minimum spacing between consecutive outbound writes
    /// (default: 50 ms).
    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Set the event broadcast channel capacity (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    fn addr(&self) -> String {
        if self.host.contains(':') {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Dial the receiver and build a controller around the connection.
    ///
    /// On success the controller has already issued its initial full
    /// refresh; cached state fills in as the unit's answers arrive.
    pub async fn build(self) -> Result<AvrController> {
        let addr = self.addr();
        let transport = TelnetTransport::connect_with_timeout(&addr, self.connect_timeout).await?;

        let controller = AvrController::start(
            Box::new(transport),
            ControllerOptions {
                host: Some(addr),
                connect_timeout: self.connect_timeout,
                send_delay: self.send_delay,
                event_capacity: self.event_capacity,
            },
        );

        controller.refresh().await?;
        Ok(controller)
    }

    /// Build a controller around a caller-provided transport.
    ///
    /// This is the entry point for testing (pass a `MockTransport` from
    /// `avrctl-test-harness`). No initial refresh is issued, so tests
    /// control exactly what goes over the wire; `reconnect()` is
    /// unavailable because no address is known.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<AvrController> {
        Ok(AvrController::start(
            transport,
            ControllerOptions {
                host: None,
                connect_timeout: self.connect_timeout,
                send_delay: self.send_delay,
                event_capacity: self.event_capacity,
            },
        ))
    }
}
