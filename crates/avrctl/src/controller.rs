//! AvrController -- the public control surface for one receiver.
//!
//! A controller owns one connection to one physical unit. Typed getters
//! read the cached device state with zero latency and never touch the
//! network; typed setters synthesize wire commands and hand them to the
//! IO task for a paced write. State is eventually consistent: a setter
//! completing means the command was written, and the cache reflects the
//! new value only once the unit's own echoed status line comes back.
//!
//! Multiple controllers (one per receiver) are fully independent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use avrctl_core::error::{Error, Result};
use avrctl_core::events::AvrEvent;
use avrctl_core::transport::Transport;
use avrctl_core::types::{is_known_input, Zone};
use avrctl_transport::TelnetTransport;

use crate::commands::{self, COMMANDS};
use crate::io::{spawn_io_task, AvrIo, IoConfig, Request};
use crate::state::DeviceState;

/// Assembly parameters handed over by [`AvrBuilder`](crate::AvrBuilder).
pub(crate) struct ControllerOptions {
    /// Address for reconnects; `None` when built from a raw transport.
    pub host: Option<String>,
    pub connect_timeout: Duration,
    pub send_delay: Duration,
    pub event_capacity: usize,
}

/// A connected AV receiver.
///
/// Constructed via [`AvrBuilder`](crate::AvrBuilder). All receiver
/// communication goes through the background IO task spawned at build
/// time; this type is cheap to share behind an `Arc`.
pub struct AvrController {
    host: Option<String>,
    connect_timeout: Duration,
    send_delay: Duration,
    state: Arc<Mutex<DeviceState>>,
    event_tx: broadcast::Sender<AvrEvent>,
    connected: Arc<AtomicBool>,
    io: Mutex<Option<AvrIo>>,
    comm_gate: FailureGate,
}

impl AvrController {
    /// Assemble a controller around an established transport and spawn its
    /// IO task. Called by the builder.
    pub(crate) fn start(transport: Box<dyn Transport>, opts: ControllerOptions) -> Self {
        let state = Arc::new(Mutex::new(DeviceState::new()));
        let (event_tx, _) = broadcast::channel(opts.event_capacity);
        let connected = Arc::new(AtomicBool::new(false));

        let io = spawn_io_task(
            transport,
            IoConfig {
                send_delay: opts.send_delay,
            },
            Arc::clone(&state),
            event_tx.clone(),
            Arc::clone(&connected),
        );

        let _ = event_tx.send(AvrEvent::Connected);

        AvrController {
            host: opts.host,
            connect_timeout: opts.connect_timeout,
            send_delay: opts.send_delay,
            state,
            event_tx,
            connected,
            io: Mutex::new(Some(io)),
            comm_gate: FailureGate::new(),
        }
    }

    /// The address this controller dials, when it owns one.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Whether the connection to the receiver is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to receiver events.
    ///
    /// Returns a broadcast receiver. The channel is bounded; a consumer
    /// that falls behind will miss events but can always resynchronize
    /// from the getters.
    pub fn subscribe(&self) -> broadcast::Receiver<AvrEvent> {
        self.event_tx.subscribe()
    }

    // -------------------------------------------------------------------
    // Getters -- pure cache reads, no network I/O
    // -------------------------------------------------------------------

    /// Get a zone's power state.
    ///
    /// `true` only when the unit has reported `ON`; an off, standby, or
    /// never-reported zone reads as `false`.
    pub async fn get_power_state(&self, zone: Zone) -> bool {
        self.state.lock().await.bool_value(zone.power_code())
    }

    /// Get a zone's mute state. Unknown reads as `false`.
    pub async fn get_mute_state(&self, zone: Zone) -> bool {
        self.state.lock().await.bool_value(zone.mute_code())
    }

    /// Get a zone's volume in real units (e.g. `50.5`).
    ///
    /// `None` until the unit has reported a volume for the zone.
    pub async fn get_volume(&self, zone: Zone) -> Option<f64> {
        self.state.lock().await.num_value(zone.volume_code())
    }

    /// Get a zone's selected input source id (e.g. `"CD"`).
    ///
    /// `None` until the unit has reported a source for the zone.
    pub async fn get_input_source(&self, zone: Zone) -> Option<String> {
        self.state
            .lock()
            .await
            .str_value(zone.source_code())
            .map(str::to_string)
    }

    /// The volume ceiling outbound sets are clamped to.
    ///
    /// Starts at the protocol default (98.0) and tracks the unit's own
    /// `MVMAX` reports.
    pub async fn max_volume(&self) -> f64 {
        self.state.lock().await.max_volume()
    }

    // -------------------------------------------------------------------
    // Setters -- synthesize a wire command, no optimistic cache update
    // -------------------------------------------------------------------

    /// Set a zone's power state.
    ///
    /// Main zone off is written as `PWSTANDBY` (the unit's irregular off
    /// encoding); other zones use `ON`/`OFF`.
    pub async fn set_power_state(&self, zone: Zone, on: bool) -> Result<()> {
        self.request_send(commands::cmd_set_power(zone, on)).await
    }

    /// Set a zone's mute state.
    pub async fn set_mute_state(&self, zone: Zone, on: bool) -> Result<()> {
        self.request_send(commands::cmd_set_mute(zone, on)).await
    }

    /// Set a zone's volume.
    ///
    /// The level is clamped to the learned ceiling and snapped to the
    /// protocol's 0.5-step grid. The `MVMAX` line the unit requires is
    /// sent in the same write.
    pub async fn set_volume(&self, zone: Zone, level: f64) -> Result<()> {
        if !level.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "volume level must be finite, got {level}"
            )));
        }
        let max = self.state.lock().await.max_volume();
        self.request_send(commands::cmd_set_volume(zone, level, max))
            .await
    }

    /// Select a zone's input source by catalog id.
    pub async fn set_input_source(&self, zone: Zone, input_id: &str) -> Result<()> {
        if !is_known_input(input_id) {
            return Err(Error::InvalidParameter(format!(
                "unknown input id: {input_id}"
            )));
        }
        self.request_send(commands::cmd_set_input(zone, input_id))
            .await
    }

    // -------------------------------------------------------------------
    // Refresh / lifecycle
    // -------------------------------------------------------------------

    /// Trigger a full query cycle: one status query per registered command
    /// code. The unit answers asynchronously; this method completes when
    /// the queries are written, not when the answers arrive.
    ///
    /// Communication failures are logged once per disconnect episode, and
    /// the first success afterwards logs a single recovery notice, so a
    /// polling caller can ignore the returned error without flooding the
    /// log.
    pub async fn refresh(&self) -> Result<()> {
        debug!("starting full state refresh");
        let result = self.query_all().await;
        match &result {
            Ok(()) => {
                if self.comm_gate.on_success() {
                    info!(
                        host = self.host.as_deref().unwrap_or("<transport>"),
                        "communication with receiver restored"
                    );
                }
            }
            Err(e) => {
                if self.comm_gate.on_failure() {
                    error!(
                        host = self.host.as_deref().unwrap_or("<transport>"),
                        error = %e,
                        "cannot communicate with receiver"
                    );
                }
            }
        }
        result
    }

    async fn query_all(&self) -> Result<()> {
        for spec in COMMANDS {
            self.request_send(commands::cmd_query(spec.code)).await?;
        }
        Ok(())
    }

    /// Tear down the current connection, if any, and dial the configured
    /// host again. Ends with a full refresh.
    ///
    /// Reconnection *policy* (whether and when) belongs to the caller;
    /// this is only the mechanism.
    pub async fn reconnect(&self) -> Result<()> {
        let host = self.host.clone().ok_or_else(|| {
            Error::InvalidParameter(
                "no host configured; controller was built from a raw transport".into(),
            )
        })?;

        {
            let mut guard = self.io.lock().await;
            if let Some(io) = guard.take() {
                io.cancel.cancel();
                let _ = io.task.await;
            }
        }

        let transport = TelnetTransport::connect_with_timeout(&host, self.connect_timeout).await?;

        {
            let mut guard = self.io.lock().await;
            *guard = Some(spawn_io_task(
                Box::new(transport),
                IoConfig {
                    send_delay: self.send_delay,
                },
                Arc::clone(&self.state),
                self.event_tx.clone(),
                Arc::clone(&self.connected),
            ));
        }

        let _ = self.event_tx.send(AvrEvent::Connected);
        self.refresh().await
    }

    /// Close the connection and stop the IO task.
    pub async fn disconnect(&self) -> Result<()> {
        let io = self.io.lock().await.take();
        if let Some(io) = io {
            if let Ok(mut transport) = io.shutdown().await {
                let _ = transport.close().await;
            }
        }
        Ok(())
    }

    /// Spawn a background task that calls [`refresh`](Self::refresh) on a
    /// fixed interval.
    ///
    /// Call on an `Arc`-wrapped controller:
    /// `Arc::clone(&controller).start_polling(interval)`. The first
    /// refresh fires one full interval after the call, matching a caller
    /// that refreshed at connect time. Errors are swallowed here because
    /// `refresh` already rate-limits its own logging.
    pub fn start_polling(self: Arc<Self>, interval: Duration) -> PollHandle {
        let controller = self;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval's first tick completes immediately; consume it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = controller.refresh().await;
                    }
                }
            }
            debug!("poll task stopped");
        });

        PollHandle { cancel, task }
    }

    /// Hand a line to the IO task and await its paced write.
    async fn request_send(&self, line: String) -> Result<()> {
        let req_tx = {
            let guard = self.io.lock().await;
            guard
                .as_ref()
                .map(|io| io.req_tx.clone())
                .ok_or(Error::NotConnected)?
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        req_tx
            .send(Request::Send {
                line,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }
}

/// Handle to a background poll task started with
/// [`AvrController::start_polling`].
pub struct PollHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Signal the poll task to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the poll task and wait for it to finish.
    pub async fn join(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// One-log-per-episode latch for poll failures.
///
/// Repeated failures while disconnected produce a single error log; the
/// first success afterwards produces a single recovery log.
#[derive(Debug, Default)]
struct FailureGate {
    notified: AtomicBool,
}

impl FailureGate {
    fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Returns `true` when it is the first of its
    /// episode and should be logged.
    fn on_failure(&self) -> bool {
        !self.notified.swap(true, Ordering::SeqCst)
    }

    /// Record a success. Returns `true` when it ends a failure episode
    /// and the recovery should be logged.
    fn on_success(&self) -> bool {
        self.notified.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AvrBuilder;
    use avrctl_test_harness::{MockHandle, MockTransport};

    async fn mock_controller() -> (AvrController, MockHandle) {
        let (mock, handle) = MockTransport::new();
        let controller = AvrBuilder::new("mock")
            .send_delay(Duration::from_millis(1))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        (controller, handle)
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

    // -------------------------------------------------------------------
    // FailureGate (poll-failure log rate limiting)
    // -------------------------------------------------------------------

    #[test]
    fn failure_gate_logs_once_per_episode() {
        let gate = FailureGate::new();

        // Two consecutive failures: only the first is logged.
        assert!(gate.on_failure());
        assert!(!gate.on_failure());

        // First success after the episode: exactly one recovery log.
        assert!(gate.on_success());
        // Steady-state successes stay quiet.
        assert!(!gate.on_success());

        // A new episode logs again.
        assert!(gate.on_failure());
        assert!(gate.on_success());
    }

    #[test]
    fn failure_gate_quiet_until_first_failure() {
        let gate = FailureGate::new();
        // Successful polls from the start never log recovery.
        assert!(!gate.on_success());
        assert!(!gate.on_success());
    }

    // -------------------------------------------------------------------
    // Getters against the unknown sentinel
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn getters_before_any_status() {
        let (controller, _handle) = mock_controller().await;

        assert!(!controller.get_power_state(Zone::Main).await);
        assert!(!controller.get_mute_state(Zone::Zone2).await);
        assert_eq!(controller.get_volume(Zone::Main).await, None);
        assert_eq!(controller.get_input_source(Zone::Zone2).await, None);
        assert_eq!(controller.max_volume().await, 98.0);
    }

    // -------------------------------------------------------------------
    // End-to-end decode scenarios
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn volume_status_reads_back_descaled() {
        let (controller, handle) = mock_controller().await;

        handle.push_line("MV505");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if s.num_value("MV").is_some())
        })
        .await;

        assert_eq!(controller.get_volume(Zone::Main).await, Some(50.5));
    }

    #[tokio::test]
    async fn zone_power_status() {
        let (controller, handle) = mock_controller().await;

        handle.push_line("Z2ON");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if s.bool_value("Z2"))
        })
        .await;

        assert!(controller.get_power_state(Zone::Zone2).await);
        assert!(!controller.get_power_state(Zone::Zone3).await);
    }

    #[tokio::test]
    async fn zone_source_status() {
        let (controller, handle) = mock_controller().await;

        handle.push_line("Z2CD");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if s.str_value("Z2SI").is_some())
        })
        .await;

        assert_eq!(
            controller.get_input_source(Zone::Zone2).await,
            Some("CD".to_string())
        );
    }

    #[tokio::test]
    async fn main_power_reports_on_off() {
        let (controller, handle) = mock_controller().await;

        handle.push_line("PWON");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if s.bool_value("PW"))
        })
        .await;
        assert!(controller.get_power_state(Zone::Main).await);

        handle.push_line("PWOFF");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if !s.bool_value("PW"))
        })
        .await;
        assert!(!controller.get_power_state(Zone::Main).await);
    }

    // -------------------------------------------------------------------
    // Setter wire encodings
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn set_power_main_off_sends_standby() {
        let (controller, handle) = mock_controller().await;

        controller.set_power_state(Zone::Main, false).await.unwrap();
        controller.set_power_state(Zone::Main, true).await.unwrap();
        controller.set_power_state(Zone::Zone2, false).await.unwrap();

        assert_eq!(
            handle.sent(),
            vec!["PWSTANDBY\r\n", "PWON\r\n", "Z2OFF\r\n"]
        );
    }

    #[tokio::test]
    async fn set_mute_encodes_without_space() {
        let (controller, handle) = mock_controller().await;

        controller.set_mute_state(Zone::Zone2, false).await.unwrap();
        assert_eq!(handle.sent(), vec!["Z2MUOFF\r\n"]);
    }

    #[tokio::test]
    async fn set_volume_compound_write() {
        let (controller, handle) = mock_controller().await;

        controller.set_volume(Zone::Zone2, 40.5).await.unwrap();
        // One write carrying both protocol lines.
        assert_eq!(handle.sent(), vec!["Z2MV405\rZ2MVMAX 98\r\n"]);
    }

    #[tokio::test]
    async fn set_volume_clamps_to_learned_ceiling() {
        let (controller, handle) = mock_controller().await;

        handle.push_line("MVMAX 86");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if s.max_volume() == 86.0)
        })
        .await;

        controller.set_volume(Zone::Main, 90.0).await.unwrap();
        assert_eq!(handle.sent(), vec!["MV86\rMVMAX 86\r\n"]);
    }

    #[tokio::test]
    async fn set_volume_rejects_non_finite() {
        let (controller, _handle) = mock_controller().await;
        let result = controller.set_volume(Zone::Main, f64::NAN).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn set_input_validates_catalog() {
        let (controller, handle) = mock_controller().await;

        let result = controller.set_input_source(Zone::Main, "VHS").await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(handle.sent().is_empty());

        controller.set_input_source(Zone::Main, "CD").await.unwrap();
        controller
            .set_input_source(Zone::Zone2, "TUNER")
            .await
            .unwrap();
        assert_eq!(handle.sent(), vec!["SICD\r\n", "Z2TUNER\r\n"]);
    }

    #[tokio::test]
    async fn setters_do_not_update_cache_optimistically() {
        let (controller, handle) = mock_controller().await;

        controller.set_volume(Zone::Main, 40.0).await.unwrap();
        assert_eq!(controller.get_volume(Zone::Main).await, None);

        // The cache moves only on the unit's echoed status.
        handle.push_line("MV40");
        wait_until({
            let state = Arc::clone(&controller.state);
            move || matches!(state.try_lock(), Ok(s) if s.num_value("MV").is_some())
        })
        .await;
        assert_eq!(controller.get_volume(Zone::Main).await, Some(40.0));
    }

    // -------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn refresh_queries_every_registered_code() {
        let (controller, handle) = mock_controller().await;

        controller.refresh().await.unwrap();

        let sent = handle.sent();
        assert_eq!(sent.len(), COMMANDS.len());
        for (frame, spec) in sent.iter().zip(COMMANDS) {
            assert_eq!(frame, &format!("{}?\r\n", spec.code));
        }
    }

    #[tokio::test]
    async fn refresh_surfaces_send_failure() {
        let (controller, handle) = mock_controller().await;
        handle.set_connected(false);

        let first = controller.refresh().await;
        assert!(first.is_err());
        // A second failing refresh still errs; the gate only affects logging.
        let second = controller.refresh().await;
        assert!(second.is_err());
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    #[tokio::test]
    async fn disconnect_stops_io() {
        let (controller, _handle) = mock_controller().await;

        wait_until({
            let connected = Arc::clone(&controller.connected);
            move || connected.load(Ordering::SeqCst)
        })
        .await;

        controller.disconnect().await.unwrap();
        assert!(!controller.is_connected());

        let result = controller.set_power_state(Zone::Main, true).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn reconnect_without_host_is_rejected() {
        let (controller, _handle) = mock_controller().await;
        let result = controller.reconnect().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let (controller, handle) = mock_controller().await;
        let mut rx = controller.subscribe();

        handle.push_line("MV505");
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            AvrEvent::VolumeChanged {
                zone: Zone::Main,
                level: 50.5
            }
        );
    }

    #[tokio::test]
    async fn polling_task_refreshes_on_interval() {
        let (controller, handle) = mock_controller().await;
        let controller = Arc::new(controller);

        let poll = Arc::clone(&controller).start_polling(Duration::from_millis(30));

        wait_until({
            let handle = handle.clone();
            move || handle.sent().len() >= COMMANDS.len()
        })
        .await;

        poll.join().await;

        // A full query cycle went out without anyone calling refresh().
        let sent = handle.sent();
        assert_eq!(&sent[0], "PW?\r\n");
    }
}
