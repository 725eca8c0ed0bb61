//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait entirely in
//! memory. Because the receiver protocol is fire-and-forget (responses are
//! not correlated with requests, and unsolicited status lines arrive at
//! any time), the mock is push/inspect rather than request/response: a
//! test feeds status lines in through a [`MockHandle`] and inspects what
//! the code under test wrote out, at any point, even after the transport
//! itself has been moved into a controller.
//!
//! # Example
//!
//! ```
//! use avrctl_test_harness::MockTransport;
//!
//! let (transport, handle) = MockTransport::new();
//! // hand `transport` to the code under test ...
//! handle.push_line("MV505");          // the unit reports volume 50.5
//! // ... and later:
//! let sent = handle.sent();           // every write, in order
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use avrctl_core::error::{Error, Result};
use avrctl_core::transport::Transport;

#[derive(Debug, Default)]
struct Inner {
    /// Every `send()` payload, in order.
    sent: Vec<Vec<u8>>,
    /// Pending inbound chunks; each entry is delivered as one `receive()`.
    rx_queue: VecDeque<Vec<u8>>,
    /// When false, send/receive fail with `ConnectionLost`.
    connected: bool,
    /// Whether `close()` has been called.
    closed: bool,
}

/// A mock [`Transport`] wired to a shared [`MockHandle`].
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

/// Test-side handle to a [`MockTransport`].
///
/// Clones share the same underlying transport, so a test can keep the
/// handle after moving the transport into a controller.
#[derive(Debug, Clone)]
pub struct MockHandle {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Create a connected mock transport and its inspection handle.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (MockTransport, MockHandle) {
        let inner = Arc::new(Mutex::new(Inner {
            connected: true,
            ..Inner::default()
        }));
        (
            MockTransport {
                inner: Arc::clone(&inner),
            },
            MockHandle { inner },
        )
    }
}

impl MockHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock transport poisoned")
    }

    /// Queue a status line as one inbound chunk, terminated with `\r` the
    /// way the unit terminates its lines.
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\r');
        self.lock().rx_queue.push_back(bytes);
    }

    /// Queue raw inbound bytes as one chunk. Use this to exercise lines
    /// split across chunks or several lines packed into one chunk.
    pub fn push_raw(&self, bytes: &[u8]) {
        self.lock().rx_queue.push_back(bytes.to_vec());
    }

    /// Every write the code under test performed, decoded as strings with
    /// their terminators intact.
    pub fn sent(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Every write as raw bytes.
    pub fn sent_raw(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    /// Forget recorded writes (useful between test phases).
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Bring the link up or down. A downed link fails send/receive with
    /// `ConnectionLost`, the way a receiver dropping the socket does.
    pub fn set_connected(&self, up: bool) {
        self.lock().connected = up;
    }

    /// Whether `close()` was called on the transport.
    pub fn was_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().expect("mock transport poisoned");
        if !inner.connected {
            return Err(Error::ConnectionLost);
        }
        inner.sent.push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut inner = self.inner.lock().expect("mock transport poisoned");
        if !inner.connected {
            return Err(Error::ConnectionLost);
        }

        match inner.rx_queue.pop_front() {
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Caller's buffer was smaller than the chunk; keep the
                    // rest at the front so nothing is lost.
                    inner.rx_queue.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
            // No pending data: report an instant timeout; the IO loop
            // treats that as "no status traffic right now".
            None => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut inner = self.inner.lock().expect("mock transport poisoned");
        inner.connected = false;
        inner.closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .expect("mock transport poisoned")
            .connected
    }
}
