//! Channel orchestration with the tokio mpsc command/notification pattern.
//!
//! The event loop runs in a dedicated tokio task owning the WebSocket.
//! External code communicates with it through typed command and
//! notification channels; reconnection happens inside the task and is
//! visible to callers only as lifecycle notifications. Presence
//! (`join_user`) is announced on every successful connect before anything
//! else flows, so server pushes can be routed to this identity regardless
//! of which conversation is active.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use tutoria_shared::constants::{
    MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_SECS,
};
use tutoria_shared::protocol::{ClientEvent, ServerEvent};
use tutoria_shared::types::UserId;

use crate::backoff::Backoff;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the socket task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Emit one event on the channel.
    Emit(ClientEvent),
    /// Close the channel and stop reconnecting.
    Shutdown,
}

/// Notifications sent *from* the socket task to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketNotification {
    /// The channel is up and presence is announced.
    Up { reconnected: bool },
    /// The channel dropped; the task keeps retrying.
    Down { reason: String },
    /// The reconnect budget is exhausted; the task has stopped.
    Lost { attempts: u32 },
    /// A server event arrived.
    Event(ServerEvent),
    /// An emit was discarded because the channel is down.
    EmitFailed { event: &'static str },
}

/// Configuration for spawning the socket task.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8085/ws`.
    pub url: String,
    /// Identity announced on every (re)connect.
    pub identity: UserId,
    /// Reconnect attempts before the channel is declared lost.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay.
    pub base_delay: Duration,
    /// Reconnect delay ceiling.
    pub max_delay: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>, identity: UserId) -> Self {
        Self {
            url: url.into(),
            identity,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_secs(RECONNECT_MAX_DELAY_SECS),
        }
    }
}

/// Spawn the socket event loop in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications.
/// The first connect happens inside the task; callers learn about it via
/// `SocketNotification::Up`.
pub fn spawn_socket(
    config: SocketConfig,
) -> (
    mpsc::Sender<SocketCommand>,
    mpsc::Receiver<SocketNotification>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SocketCommand>(256);
    let (notif_tx, notif_rx) = mpsc::channel::<SocketNotification>(256);

    tokio::spawn(run_channel(config, cmd_rx, notif_tx));

    (cmd_tx, notif_rx)
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

async fn run_channel(
    config: SocketConfig,
    mut cmd_rx: mpsc::Receiver<SocketCommand>,
    notif_tx: mpsc::Sender<SocketNotification>,
) {
    let backoff = Backoff::new(config.base_delay, config.max_delay);
    let mut attempts: u32 = 0;
    let mut ever_connected = false;

    loop {
        match connect_async(config.url.as_str()).await {
            Ok((mut ws, _)) => {
                // Presence first; nothing can be routed to us before it
                let announce = ClientEvent::JoinUser(config.identity.clone());
                match emit(&mut ws, &announce).await {
                    Ok(()) => {
                        attempts = 0;
                        info!(
                            url = %config.url,
                            identity = %config.identity,
                            reconnected = ever_connected,
                            "Channel up"
                        );
                        let _ = notif_tx
                            .send(SocketNotification::Up {
                                reconnected: ever_connected,
                            })
                            .await;
                        ever_connected = true;

                        match run_session(&mut ws, &mut cmd_rx, &notif_tx).await {
                            SessionEnd::Shutdown => {
                                let _ = ws.close(None).await;
                                info!("Channel shut down");
                                return;
                            }
                            SessionEnd::Dropped(reason) => {
                                warn!(reason = %reason, "Channel dropped");
                                let _ = notif_tx
                                    .send(SocketNotification::Down { reason })
                                    .await;
                            }
                        }
                    }
                    Err(reason) => {
                        warn!(error = %reason, "Presence announce failed");
                        let _ = notif_tx.send(SocketNotification::Down { reason }).await;
                    }
                }
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(url = %config.url, error = %reason, "Connect failed");
                let _ = notif_tx.send(SocketNotification::Down { reason }).await;
            }
        }

        attempts += 1;
        if attempts > config.max_reconnect_attempts {
            error!(attempts = attempts - 1, "Reconnect budget exhausted");
            let _ = notif_tx
                .send(SocketNotification::Lost {
                    attempts: attempts - 1,
                })
                .await;
            return;
        }

        let delay = backoff.delay(attempts);
        debug!(
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Waiting before reconnect"
        );
        if !wait_backoff(delay, &mut cmd_rx, &notif_tx).await {
            return;
        }
    }
}

/// One connected session. Returns how it ended.
async fn run_session(
    ws: &mut WsStream,
    cmd_rx: &mut mpsc::Receiver<SocketCommand>,
    notif_tx: &mpsc::Sender<SocketNotification>,
) -> SessionEnd {
    loop {
        tokio::select! {
            // --- Outgoing commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SocketCommand::Emit(event)) => {
                        let name = event.name();
                        if let Err(reason) = emit(ws, &event).await {
                            error!(event = name, error = %reason, "Emit failed");
                            let _ = notif_tx
                                .send(SocketNotification::EmitFailed { event: name })
                                .await;
                            return SessionEnd::Dropped(reason);
                        }
                        debug!(event = name, "Event emitted");
                    }
                    Some(SocketCommand::Shutdown) => return SessionEnd::Shutdown,
                    None => {
                        // All senders dropped
                        info!("Command channel closed, shutting down socket");
                        return SessionEnd::Shutdown;
                    }
                }
            }

            // --- Incoming frames ---
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match ServerEvent::from_text(&text) {
                            Ok(event) => {
                                debug!(event = event.name(), len = text.len(), "Event received");
                                let _ = notif_tx.send(SocketNotification::Event(event)).await;
                            }
                            Err(e) => {
                                warn!(error = %e, len = text.len(), "Discarding unreadable frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = ws.send(Message::Pong(payload)).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Dropped("closed by server".to_string());
                    }
                    // Binary and pong frames are not part of the protocol
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                }
            }
        }
    }
}

/// Sleep out a backoff delay while still honoring commands: emits fail
/// fast rather than queue, shutdown stops the task. Returns `false` when
/// the task must stop.
async fn wait_backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::Receiver<SocketCommand>,
    notif_tx: &mpsc::Sender<SocketNotification>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCommand::Emit(event)) => {
                    warn!(event = event.name(), "Emit while channel down, discarding");
                    let _ = notif_tx
                        .send(SocketNotification::EmitFailed { event: event.name() })
                        .await;
                }
                Some(SocketCommand::Shutdown) | None => return false,
            },
        }
    }
}

async fn emit(ws: &mut WsStream, event: &ClientEvent) -> Result<(), String> {
    let text = event.to_text().map_err(|e| e.to_string())?;
    ws.send(Message::Text(text)).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;
    use tutoria_shared::types::CourseId;

    const WAIT: Duration = Duration::from_secs(5);

    async fn bind_test_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn recv_until<F>(rx: &mut mpsc::Receiver<SocketNotification>, mut pred: F) -> SocketNotification
    where
        F: FnMut(&SocketNotification) -> bool,
    {
        timeout(WAIT, async {
            loop {
                let notif = rx.recv().await.expect("notification channel closed");
                if pred(&notif) {
                    return notif;
                }
            }
        })
        .await
        .expect("timed out waiting for notification")
    }

    fn fast_config(url: &str, identity: &str) -> SocketConfig {
        SocketConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            ..SocketConfig::new(url, UserId::from(identity))
        }
    }

    #[tokio::test]
    async fn test_presence_announced_on_connect() {
        let (listener, url) = bind_test_server().await;
        let (_cmd_tx, _notif_rx) = spawn_socket(SocketConfig::new(&url, UserId::from("u-1")));

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let event = ClientEvent::from_text(first.to_text().unwrap()).unwrap();
        assert_eq!(event, ClientEvent::JoinUser(UserId::from("u-1")));
    }

    #[tokio::test]
    async fn test_emit_and_receive_roundtrip() {
        let (listener, url) = bind_test_server().await;
        let (cmd_tx, mut notif_rx) = spawn_socket(SocketConfig::new(&url, UserId::from("u-1")));

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _presence = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();

        match recv_until(&mut notif_rx, |n| matches!(n, SocketNotification::Up { .. })).await {
            SocketNotification::Up { reconnected } => assert!(!reconnected),
            _ => unreachable!(),
        }

        cmd_tx
            .send(SocketCommand::Emit(ClientEvent::JoinCommunity {
                course_id: CourseId::from("crs-1"),
            }))
            .await
            .unwrap();
        let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let event = ClientEvent::from_text(frame.to_text().unwrap()).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinCommunity {
                course_id: CourseId::from("crs-1")
            }
        );

        let push = ServerEvent::NotificationRead {
            notification_id: "n-1".to_string(),
        };
        ws.send(Message::Text(push.to_text().unwrap())).await.unwrap();
        let notif = recv_until(&mut notif_rx, |n| {
            matches!(n, SocketNotification::Event(_))
        })
        .await;
        assert_eq!(notif, SocketNotification::Event(push));
    }

    #[tokio::test]
    async fn test_reconnect_reannounces_presence() {
        let (listener, url) = bind_test_server().await;
        let (_cmd_tx, mut notif_rx) = spawn_socket(fast_config(&url, "u-2"));

        // First connection dies right after the presence frame
        {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = timeout(WAIT, ws.next()).await.unwrap();
        }

        // Second connection announces presence again
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        let event = ClientEvent::from_text(frame.to_text().unwrap()).unwrap();
        assert_eq!(event, ClientEvent::JoinUser(UserId::from("u-2")));

        match recv_until(&mut notif_rx, |n| {
            matches!(n, SocketNotification::Up { reconnected: true })
        })
        .await
        {
            SocketNotification::Up { reconnected } => assert!(reconnected),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_emit_while_down_fails_fast() {
        // Nothing listens on port 1, so the task sits in backoff
        let mut config = fast_config("ws://127.0.0.1:1", "u-3");
        config.base_delay = Duration::from_millis(200);
        config.max_delay = Duration::from_millis(400);
        let (cmd_tx, mut notif_rx) = spawn_socket(config);

        recv_until(&mut notif_rx, |n| matches!(n, SocketNotification::Down { .. })).await;

        cmd_tx
            .send(SocketCommand::Emit(ClientEvent::JoinCommunity {
                course_id: CourseId::from("crs-1"),
            }))
            .await
            .unwrap();
        let notif = recv_until(&mut notif_rx, |n| {
            matches!(n, SocketNotification::EmitFailed { .. })
        })
        .await;
        assert_eq!(
            notif,
            SocketNotification::EmitFailed {
                event: "join_community"
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_lost() {
        let mut config = fast_config("ws://127.0.0.1:1", "u-4");
        config.max_reconnect_attempts = 2;
        let (_cmd_tx, mut notif_rx) = spawn_socket(config);

        let notif =
            recv_until(&mut notif_rx, |n| matches!(n, SocketNotification::Lost { .. })).await;
        assert_eq!(notif, SocketNotification::Lost { attempts: 2 });
    }
}
