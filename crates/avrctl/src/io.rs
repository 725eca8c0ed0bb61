//! IO task owning the receiver connection.
//!
//! One tokio task per controller owns the transport exclusively and does
//! all the wire work: paced outbound writes, inbound chunk reassembly,
//! status-line decoding, and state-cache mutation. Controller methods talk
//! to it over an `mpsc` channel and get per-request `oneshot` replies.
//!
//! Two protocol realities shape the loop:
//!
//! - The receiver drops frames when writes arrive back to back, so
//!   outbound lines are queued and released on a minimum spacing. The
//!   spacing is enforced with a scheduled wake-up inside the select loop,
//!   never a blocking sleep, so inbound processing and every other task
//!   keep running during the gap.
//! - Inbound lines are not correlated with requests at all; whatever
//!   arrives is decoded and merged into the cache, whether it was
//!   solicited or not.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use avrctl_core::error::{Error, Result};
use avrctl_core::events::AvrEvent;
use avrctl_core::transport::Transport;

use crate::commands::{self, StateUpdate};
use crate::protocol::{self, LineSplitter};
use crate::state::DeviceState;

/// How long a single idle receive waits before yielding back to the loop.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration for the IO task.
pub(crate) struct IoConfig {
    /// Minimum spacing between consecutive outbound writes.
    pub send_delay: Duration,
}

/// A request sent from controller methods to the IO task.
pub(crate) enum Request {
    /// Queue a command line for a paced write. The reply resolves once the
    /// line has actually been written (or the write failed).
    Send {
        line: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Graceful shutdown; returns the transport for closing.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Handle to the IO task. Stored inside the controller.
pub(crate) struct AvrIo {
    pub req_tx: mpsc::Sender<Request>,
    /// Cancellation token for teardown without transport recovery.
    pub cancel: CancellationToken,
    /// Join handle for the IO task.
    pub task: JoinHandle<()>,
}

impl AvrIo {
    /// Queue a line and await its write completing.
    pub async fn send_line(&self, line: String) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.req_tx
            .send(Request::Send {
                line,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Shut down the IO task and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .req_tx
            .send(Request::Shutdown { reply: reply_tx })
            .await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

/// Spawn the IO task. Returns the handle for sending commands.
pub(crate) fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    state: Arc<Mutex<DeviceState>>,
    event_tx: broadcast::Sender<AvrEvent>,
    connected: Arc<AtomicBool>,
) -> AvrIo {
    let (req_tx, req_rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    connected.store(true, Ordering::SeqCst);

    let task = tokio::spawn(io_loop(
        transport,
        config,
        state,
        event_tx,
        connected,
        req_rx,
        cancel_clone,
    ));

    AvrIo {
        req_tx,
        cancel,
        task,
    }
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Request intake (queueing is instant; writes are paced separately)
/// 3. The next paced write, once its send slot arrives
/// 4. Idle reading of inbound status traffic
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    state: Arc<Mutex<DeviceState>>,
    event_tx: broadcast::Sender<AvrEvent>,
    connected: Arc<AtomicBool>,
    mut req_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut splitter = LineSplitter::new();
    let mut outbox: VecDeque<(String, oneshot::Sender<Result<()>>)> = VecDeque::new();
    let mut next_send_at = tokio::time::Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break;
            }

            req = req_rx.recv() => {
                match req {
                    Some(Request::Send { line, reply }) => {
                        outbox.push_back((line, reply));
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!("IO task shutdown requested");
                        connected.store(false, Ordering::SeqCst);
                        let _ = reply.send(transport);
                        let _ = event_tx.send(AvrEvent::Disconnected);
                        return;
                    }
                    None => {
                        debug!("request channel closed, exiting IO task");
                        break;
                    }
                }
            }

            _ = tokio::time::sleep_until(next_send_at), if !outbox.is_empty() => {
                if let Some((line, reply)) = outbox.pop_front() {
                    debug!(line = %line, "sending command");
                    let result = transport.send(&protocol::frame(&line)).await;
                    next_send_at = tokio::time::Instant::now() + config.send_delay;
                    let failed = result.is_err();
                    if let Err(e) = &result {
                        warn!(line = %line, error = %e, "send to receiver failed");
                    }
                    let _ = reply.send(result);
                    if failed {
                        break;
                    }
                }
            }

            outcome = read_chunk(transport.as_mut()) => {
                match outcome {
                    Ok(Some(chunk)) => {
                        splitter.push(&chunk);
                        process_lines(&mut splitter, &state, &event_tx).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "receiver connection lost");
                        break;
                    }
                }
            }
        }
    }

    // Any exit other than Shutdown lands here: a transport failure, a
    // cancel, or the controller being dropped. Pending replies in the
    // outbox are dropped, which surfaces as NotConnected to their callers.
    connected.store(false, Ordering::SeqCst);
    let _ = event_tx.send(AvrEvent::Disconnected);
}

/// One idle read. Distinguishes "no traffic" (yield and come back) from a
/// dead link (propagate so the loop exits).
async fn read_chunk(transport: &mut dyn Transport) -> Result<Option<Vec<u8>>> {
    let mut buf = [0u8; 1024];
    match transport.receive(&mut buf, RECEIVE_TIMEOUT).await {
        Ok(n) if n > 0 => Ok(Some(buf[..n].to_vec())),
        Ok(_) => Ok(None),
        Err(Error::Timeout) => {
            // No status traffic right now; yield briefly so a mock
            // transport's instant timeout cannot spin the loop hot.
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Drain complete lines from the splitter through the command table into
/// the state cache, broadcasting any resulting change events.
async fn process_lines(
    splitter: &mut LineSplitter,
    state: &Arc<Mutex<DeviceState>>,
    event_tx: &broadcast::Sender<AvrEvent>,
) {
    while let Some(line) = splitter.next_line() {
        let Some((spec, payload)) = commands::resolve(&line) else {
            debug!(line = %line, "ignoring line with unregistered prefix");
            continue;
        };

        let update = commands::decode(spec, payload);
        if matches!(update, StateUpdate::Skip) {
            debug!(
                code = spec.code,
                label = spec.label,
                payload = %payload,
                "payload matched no known shape, dropping"
            );
            continue;
        }

        let event = state.lock().await.apply(update);
        if let Some(event) = event {
            let _ = event_tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrctl_test_harness::MockTransport;

    fn harness() -> (
        AvrIo,
        avrctl_test_harness::MockHandle,
        Arc<Mutex<DeviceState>>,
        broadcast::Receiver<AvrEvent>,
        Arc<AtomicBool>,
    ) {
        let (mock, handle) = MockTransport::new();
        let state = Arc::new(Mutex::new(DeviceState::new()));
        let (event_tx, event_rx) = broadcast::channel(64);
        let connected = Arc::new(AtomicBool::new(false));
        let io = spawn_io_task(
            Box::new(mock),
            IoConfig {
                send_delay: Duration::from_millis(1),
            },
            Arc::clone(&state),
            event_tx,
            Arc::clone(&connected),
        );
        (io, handle, state, event_rx, connected)
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn sends_are_framed_and_ordered() {
        let (io, handle, _state, _rx, _connected) = harness();

        io.send_line("PW?".into()).await.unwrap();
        io.send_line("MV?".into()).await.unwrap();

        assert_eq!(handle.sent(), vec!["PW?\r\n", "MV?\r\n"]);
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn inbound_lines_update_state() {
        let (io, handle, state, _rx, _connected) = harness();

        handle.push_line("MV505");
        handle.push_line("PWON");

        {
            let state = Arc::clone(&state);
            wait_until(move || {
                let s = state.try_lock();
                matches!(s, Ok(s) if s.num_value("MV") == Some(50.5) && s.bool_value("PW"))
            })
            .await;
        }

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn inbound_changes_are_broadcast() {
        let (io, handle, _state, mut rx, _connected) = harness();

        handle.push_line("Z2ON");
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            AvrEvent::PowerChanged {
                zone: avrctl_core::Zone::Zone2,
                on: true
            }
        );

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_prefixes_and_shapes_are_dropped_silently() {
        let (io, handle, state, _rx, _connected) = harness();

        handle.push_line("XXWHAT");
        handle.push_line("Z2SLEEP120");
        handle.push_line("MV505");

        {
            let state = Arc::clone(&state);
            wait_until(move || {
                matches!(state.try_lock(), Ok(s) if s.num_value("MV") == Some(50.5))
            })
            .await;
        }

        // Nothing but the MV landed.
        let s = state.lock().await;
        assert_eq!(s.str_value("Z2SI"), None);
        assert!(!s.bool_value("Z2"));

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn connection_loss_stops_task_and_broadcasts() {
        let (io, handle, _state, mut rx, connected) = harness();

        wait_until({
            let connected = Arc::clone(&connected);
            move || connected.load(Ordering::SeqCst)
        })
        .await;

        handle.set_connected(false);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, AvrEvent::Disconnected);
        assert!(!connected.load(Ordering::SeqCst));

        // The task is gone; further sends report not-connected.
        let result = io.send_line("PW?".into()).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_recovers_transport() {
        let (io, _handle, _state, _rx, connected) = harness();

        let transport = io.shutdown().await.unwrap();
        assert!(transport.is_connected());
        assert!(!connected.load(Ordering::SeqCst));
    }
}
