//! Mock receiver for protocol-level testing over real TCP.
//!
//! [`MockAvrServer`] is a lightweight TCP listener that behaves like a
//! receiver's control port: it accepts one connection, answers scripted
//! status queries, records every line the client sent, and can push
//! unsolicited status lines at any time -- the part of the real protocol
//! that request/response mocks cannot model.
//!
//! # Example
//!
//! ```no_run
//! use avrctl_test_harness::MockAvrServer;
//!
//! # async fn example() -> avrctl_core::Result<()> {
//! let mut server = MockAvrServer::new().await?;
//! server.respond("PW?", &["PWON"]);
//! server.respond("MV?", &["MV505", "MVMAX 86"]);
//! server.start();
//!
//! // Connect a TelnetTransport or a full controller to server.addr() ...
//! server.push("Z2ON").await; // unsolicited status
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use avrctl_core::error::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A scripted mock receiver listening on a random localhost port.
pub struct MockAvrServer {
    addr: String,
    listener: Option<TcpListener>,
    replies: HashMap<String, Vec<String>>,
    received: Arc<Mutex<Vec<String>>>,
    push_tx: mpsc::Sender<String>,
    push_rx: Option<mpsc::Receiver<String>>,
    handle: Option<JoinHandle<()>>,
}

impl MockAvrServer {
    /// Bind a mock receiver on a random port.
    ///
    /// The listener is held open immediately so a client may start
    /// connecting as soon as [`start`](MockAvrServer::start) is called.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock receiver: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();
        let (push_tx, push_rx) = mpsc::channel(32);

        Ok(Self {
            addr,
            listener: Some(listener),
            replies: HashMap::new(),
            received: Arc::new(Mutex::new(Vec::new())),
            push_tx,
            push_rx: Some(push_rx),
            handle: None,
        })
    }

    /// Script the status lines sent back when the client sends `query`.
    ///
    /// Queries with no scripted reply are recorded and ignored, the way a
    /// real unit ignores commands it does not care to answer.
    pub fn respond(&mut self, query: &str, lines: &[&str]) {
        self.replies
            .insert(query.to_string(), lines.iter().map(|s| s.to_string()).collect());
    }

    /// The address the mock receiver is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Accept one client and start serving scripted replies.
    pub fn start(&mut self) {
        let listener = self
            .listener
            .take()
            .expect("mock receiver already started");
        let replies = self.replies.clone();
        let received = Arc::clone(&self.received);
        let push_rx = self.push_rx.take().expect("mock receiver already started");

        self.handle = Some(tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            serve_client(stream, replies, received, push_rx).await;
        }));
    }

    /// Push an unsolicited status line to the connected client.
    pub async fn push(&self, line: &str) {
        let _ = self.push_tx.send(line.to_string()).await;
    }

    /// Every line received from the client so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().expect("mock receiver poisoned").clone()
    }

    /// Stop the server task and drop the connection.
    pub fn stop(self) {
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

/// Serve one client connection: record its lines, answer scripted
/// queries, forward pushes.
async fn serve_client(
    mut stream: TcpStream,
    replies: HashMap<String, Vec<String>>,
    received: Arc<Mutex<Vec<String>>>,
    mut push_rx: mpsc::Receiver<String>,
) {
    let mut buf = [0u8; 1024];
    let mut acc: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            maybe_push = push_rx.recv() => {
                match maybe_push {
                    Some(line) => {
                        if stream
                            .write_all(format!("{line}\r").as_bytes())
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    None => break, // server handle dropped
                }
            }

            read = stream.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                acc.extend_from_slice(&buf[..n]);

                // Client lines end with \r\n; the compound volume command
                // carries an inner \r. Split on \r and drop LF leftovers.
                while let Some(pos) = acc.iter().position(|&b| b == b'\r') {
                    let line: Vec<u8> = acc.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line[..line.len() - 1])
                        .trim()
                        .to_string();
                    if text.is_empty() {
                        continue;
                    }
                    received
                        .lock()
                        .expect("mock receiver poisoned")
                        .push(text.clone());

                    if let Some(lines) = replies.get(&text) {
                        for reply in lines {
                            if stream
                                .write_all(format!("{reply}\r").as_bytes())
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}
