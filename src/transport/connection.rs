//! WebSocket connection and receive loop.
//!
//! This module owns the duplex channel to the runtime: request/response
//! correlation by monotonically increasing id, and routing of inbound
//! frames to either a pending request or the event handler.
//!
//! # Receive Loop
//!
//! The connection spawns one tokio task that handles:
//!
//! - Inbound frames from the runtime (responses, events)
//! - Outbound commands from callers
//! - Correlation cleanup for timed-out requests
//!
//! Responses may arrive out of order relative to sends; matching is by
//! correlation id only. Malformed frames are logged and skipped, never
//! fatal to the loop. When the loop terminates (remote closure, read error,
//! or shutdown), every pending request fails with `ConnectionClosed` and the
//! closed handler fires exactly once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{CommandFrame, CommandId, EventFrame, InboundFrame};

// ============================================================================
// Constants
// ============================================================================

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// WebSocket stream type used by the client connection.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of correlation ids to response channels.
type PendingMap = FxHashMap<CommandId, oneshot::Sender<Result<Value>>>;

/// Event handler callback type.
///
/// Called on the receive-loop task for each event frame.
pub type EventHandler = Arc<dyn Fn(EventFrame) + Send + Sync>;

/// Closure notification callback type.
///
/// Called exactly once when the receive loop terminates.
pub type ClosedHandler = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the receive loop.
enum ConnectionCommand {
    /// Send a command frame and await its response.
    Send {
        frame: CommandFrame,
        response_tx: oneshot::Sender<Result<Value>>,
    },
    /// Remove a timed-out correlation entry.
    RemovePending(CommandId),
    /// Shut the connection down.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Duplex channel to the runtime.
///
/// Handles request/response correlation and event routing. The connection
/// spawns an internal receive-loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks.
pub struct Connection {
    /// Channel for sending commands to the receive loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with the receive loop).
    pending: Arc<Mutex<PendingMap>>,
    /// Next correlation id; monotonic within this connection.
    next_id: Arc<AtomicU64>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            pending: Arc::clone(&self.pending),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl Connection {
    /// Opens the channel against a target's attach address.
    ///
    /// `event_handler` receives every event frame; `on_closed` fires exactly
    /// once when the receive loop terminates for any reason.
    ///
    /// # Errors
    ///
    /// - [`Error::WebSocket`] if the channel cannot be opened
    pub async fn connect(
        ws_url: &str,
        event_handler: EventHandler,
        on_closed: ClosedHandler,
    ) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        debug!(%ws_url, "Channel opened");

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(PendingMap::default()));

        tokio::spawn(Self::run_receive_loop(
            ws_stream,
            command_rx,
            Arc::clone(&pending),
            event_handler,
            on_closed,
        ));

        Ok(Self {
            command_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Sends a command and awaits its response.
    ///
    /// On timeout the pending entry is removed before returning; a late
    /// response for that id is then discarded by the receive loop.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the channel is closed
    /// - [`Error::RequestTimeout`] if no response arrives within `timeout`
    /// - [`Error::CommandFailed`] if the runtime rejected the command
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        request_timeout: Duration,
    ) -> Result<Value> {
        {
            let pending = self.pending.lock();
            if pending.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = pending.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    pending.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let command_id = CommandId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let frame = CommandFrame::new(command_id, method, params);

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send { frame, response_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        // The timeout composes with connection teardown: if the loop dies,
        // the sender side drops and the await resolves early.
        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemovePending(command_id));

                Err(Error::request_timeout(
                    command_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Shuts the connection down gracefully. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Receive loop handling channel I/O.
    async fn run_receive_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        pending: Arc<Mutex<PendingMap>>,
        event_handler: EventHandler,
        on_closed: ClosedHandler,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Inbound frames from the runtime
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_inbound_frame(&text, &pending, &event_handler);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("Channel closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "Channel read error");
                            break;
                        }

                        None => {
                            debug!("Channel stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from callers
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { frame, response_tx }) => {
                            Self::handle_send_command(
                                frame,
                                response_tx,
                                &mut ws_write,
                                &pending,
                            ).await;
                        }

                        Some(ConnectionCommand::RemovePending(command_id)) => {
                            pending.lock().remove(&command_id);
                            debug!(%command_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        Self::fail_pending_requests(&pending);
        on_closed();

        debug!("Receive loop terminated");
    }

    /// Routes one inbound text frame.
    fn handle_inbound_frame(
        text: &str,
        pending: &Arc<Mutex<PendingMap>>,
        event_handler: &EventHandler,
    ) {
        match serde_json::from_str::<InboundFrame>(text) {
            Ok(InboundFrame::Response(response)) => {
                let tx = pending.lock().remove(&response.id);

                if let Some(tx) = tx {
                    let _ = tx.send(response.into_result());
                } else {
                    // Already timed out, or a frame for a foreign session.
                    warn!(id = %response.id, "Response for unknown request");
                }
            }

            Ok(InboundFrame::Event(event)) => {
                trace!(method = %event.method, "Event frame");
                event_handler(event);
            }

            Err(e) => {
                warn!(error = %e, text, "Failed to parse inbound frame");
            }
        }
    }

    /// Handles a send command from a caller.
    async fn handle_send_command(
        frame: CommandFrame,
        response_tx: oneshot::Sender<Result<Value>>,
        ws_write: &mut futures_util::stream::SplitSink<WsStream, Message>,
        pending: &Arc<Mutex<PendingMap>>,
    ) {
        let command_id = frame.id;

        let json = match serde_json::to_string(&frame) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Register before writing; the response cannot outrun the insert.
        pending.lock().insert(command_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            if let Some(tx) = pending.lock().remove(&command_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
            return;
        }

        trace!(%command_id, method = %frame.method, "Command sent");
    }

    /// Fails all pending requests with `ConnectionClosed`.
    fn fail_pending_requests(pending: &Arc<Mutex<PendingMap>>) {
        let drained: Vec<_> = pending.lock().drain().collect();
        let count = drained.len();

        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Spawns a WebSocket server that hands each accepted stream to `serve`.
    async fn spawn_ws_server<F, Fut>(serve: F) -> String
    where
        F: Fn(WebSocketStream<TcpStream>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let ws = accept_async(socket).await.expect("accept ws");
                serve(ws).await;
            }
        });

        format!("ws://127.0.0.1:{port}")
    }

    fn noop_handlers() -> (EventHandler, ClosedHandler) {
        (Arc::new(|_| {}), Arc::new(|| {}))
    }

    #[tokio::test]
    async fn test_out_of_order_responses_correlate_by_id() {
        // Reads two commands, answers them in reverse order, echoing the
        // method back so the caller can verify correlation.
        let url = spawn_ws_server(|mut ws| async move {
            let mut frames = Vec::new();
            for _ in 0..2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    let frame: Value = serde_json::from_str(&text).expect("frame");
                    frames.push(frame);
                }
            }
            for frame in frames.iter().rev() {
                let reply = json!({
                    "id": frame["id"],
                    "result": { "echo": frame["method"] }
                })
                .to_string();
                ws.send(Message::Text(reply.into())).await.expect("send");
            }
        })
        .await;

        let (events, closed) = noop_handlers();
        let conn = Connection::connect(&url, events, closed).await.expect("connect");

        let a = conn.clone();
        let first = tokio::spawn(async move {
            a.send("Runtime.enable", json!({}), Duration::from_secs(2)).await
        });
        let b = conn.clone();
        let second = tokio::spawn(async move {
            b.send("Page.enable", json!({}), Duration::from_secs(2)).await
        });

        let first = first.await.expect("join").expect("response");
        let second = second.await.expect("join").expect("response");

        assert_eq!(first["echo"], "Runtime.enable");
        assert_eq!(second["echo"], "Page.enable");
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_entry() {
        // Reads commands, never answers.
        let url = spawn_ws_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (events, closed) = noop_handlers();
        let conn = Connection::connect(&url, events, closed).await.expect("connect");

        let err = conn
            .send("Runtime.evaluate", json!({}), Duration::from_millis(50))
            .await
            .expect_err("should time out");
        assert!(err.is_timeout());

        // Removal travels through the command channel; give the loop a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_event_frames_reach_handler() {
        let url = spawn_ws_server(|mut ws| async move {
            let event = json!({
                "method": "Page.frameNavigated",
                "params": { "frame": { "url": "https://app.clickup.com/t/xyz789" } }
            })
            .to_string();
            ws.send(Message::Text(event.into())).await.expect("send");
            // Keep the channel open until the client drops.
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = Arc::clone(&seen);
        let handler: EventHandler = Arc::new(move |event| {
            seen_in_handler.lock().push(event.method);
        });

        let _conn = Connection::connect(&url, handler, Arc::new(|| {}))
            .await
            .expect("connect");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.lock().as_slice(), ["Page.frameNavigated"]);
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_kill_loop() {
        let url = spawn_ws_server(|mut ws| async move {
            ws.send(Message::Text("not json".to_string().into()))
                .await
                .expect("send garbage");

            // Still answers the next command.
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Value = serde_json::from_str(&text).expect("frame");
                let reply = json!({ "id": frame["id"], "result": {} }).to_string();
                ws.send(Message::Text(reply.into())).await.expect("send");
            }
        })
        .await;

        let (events, closed) = noop_handlers();
        let conn = Connection::connect(&url, events, closed).await.expect("connect");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = conn
            .send("Runtime.enable", json!({}), Duration::from_secs(2))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_remote_close_fails_pending_and_fires_closed_once() {
        // Accepts a command, then closes without answering.
        let url = spawn_ws_server(|mut ws| async move {
            let _ = ws.next().await;
            let _ = ws.close(None).await;
        })
        .await;

        let closed_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed_count);
        let on_closed: ClosedHandler = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let conn = Connection::connect(&url, Arc::new(|_| {}), on_closed)
            .await
            .expect("connect");

        let err = conn
            .send("Runtime.evaluate", json!({}), Duration::from_secs(2))
            .await
            .expect_err("should fail on closure");
        assert!(matches!(err, Error::ConnectionClosed));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(closed_count.load(Ordering::SeqCst), 1);
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_command_error_member_maps_to_command_failed() {
        let url = spawn_ws_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Value = serde_json::from_str(&text).expect("frame");
                let reply = json!({
                    "id": frame["id"],
                    "error": { "code": -32601, "message": "Method not found" }
                })
                .to_string();
                ws.send(Message::Text(reply.into())).await.expect("send");
            }
        })
        .await;

        let (events, closed) = noop_handlers();
        let conn = Connection::connect(&url, events, closed).await.expect("connect");

        let err = conn
            .send("Bogus.method", json!({}), Duration::from_secs(2))
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let url = spawn_ws_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (events, closed) = noop_handlers();
        let conn = Connection::connect(&url, events, closed).await.expect("connect");

        conn.shutdown();
        conn.shutdown();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = conn
            .send("Runtime.enable", json!({}), Duration::from_millis(100))
            .await
            .expect_err("closed");
        assert!(err.is_connection_error());
    }
}
