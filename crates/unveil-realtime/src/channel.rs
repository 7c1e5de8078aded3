//! Channel orchestration with the tokio mpsc command pattern.
//!
//! The socket lives in a dedicated tokio task. External code talks to it
//! through typed commands, receives server events through the channel's
//! [`EventBus`], and observes connection state through a watch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use unveil_shared::auth::CredentialProvider;
use unveil_shared::constants::{
    COMMAND_CHANNEL_CAPACITY, DEFAULT_WS_URL, HEARTBEAT_INTERVAL_SECS, INITIAL_RECONNECT_DELAY_MS,
    MAX_RECONNECT_ATTEMPTS, MAX_RECONNECT_DELAY_MS,
};
use unveil_shared::protocol::{ClientEvent, OutgoingMessage, ServerEvent};
use unveil_shared::types::MatchId;

use crate::bus::{EventBus, ListenerId};
use crate::connection;

// ---------------------------------------------------------------------------
// Command / state types
// ---------------------------------------------------------------------------

/// Commands sent *into* the connection task.
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    /// Join a match room and remember the membership.
    JoinRoom(MatchId),
    /// Leave a match room and forget the membership.
    LeaveRoom(MatchId),
    /// Emit an event frame as-is.
    Emit(ClientEvent),
    /// Request a snapshot of currently joined rooms.
    Rooms(oneshot::Sender<Vec<MatchId>>),
    /// Tear the connection down for good.
    Shutdown,
}

/// Why the channel is (or ended up) disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Never connected during this process.
    Initial,
    /// Lost to a network fault; reconnection is or was in progress.
    Transient,
    /// The server closed the connection on purpose. No reconnection;
    /// the session layer decides what to do (typically force a logout).
    ServerClosed,
    /// No credential was available.
    LoggedOut,
    /// The reconnect budget ran out. A later `connect()` starts over.
    RetriesExhausted,
    /// Local `disconnect()` call.
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected(DisconnectReason),
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Outcome of a best-effort emit. Nothing here is an error: emitting while
/// down is reported and dropped, matching the rest of the client's
/// "observable, not thrown" failure surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStatus {
    Sent,
    NotConnected,
}

impl EmitStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Configuration for the realtime channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Reconnection attempts per outage before giving up.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay; doubles per failed attempt.
    pub initial_reconnect_delay: Duration,
    /// Reconnect delay cap.
    pub max_reconnect_delay: Duration,
    /// Keepalive ping interval.
    pub heartbeat_interval: Duration,
}

impl ChannelConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_reconnect_delay: Duration::from_millis(INITIAL_RECONNECT_DELAY_MS),
            max_reconnect_delay: Duration::from_millis(MAX_RECONNECT_DELAY_MS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to the realtime channel. One instance per session; share it with
/// `Arc` wherever events need to be consumed or emitted.
pub struct RealtimeChannel {
    config: ChannelConfig,
    credentials: Arc<dyn CredentialProvider>,
    bus: Arc<EventBus>,
    state: Arc<watch::Sender<ConnectionState>>,
    cmd_tx: Mutex<Option<mpsc::Sender<ChannelCommand>>>,
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let (state_tx, _state_rx) =
            watch::channel(ConnectionState::Disconnected(DisconnectReason::Initial));

        Self {
            config,
            credentials,
            bus: Arc::new(EventBus::new()),
            state: Arc::new(state_tx),
            cmd_tx: Mutex::new(None),
        }
    }

    /// Open the channel. No-op when a connection task is already running or
    /// when no credential is available. Connection failures never surface
    /// here; they show up on the state watch.
    pub fn connect(&self) {
        let Ok(mut guard) = self.cmd_tx.lock() else {
            return;
        };

        if let Some(tx) = guard.as_ref() {
            if !tx.is_closed() {
                debug!("Realtime channel already up; connect is a no-op");
                return;
            }
        }

        if self.credentials.bearer_token().is_none() {
            debug!("No credential; leaving the realtime channel down");
            self.state
                .send_replace(ConnectionState::Disconnected(DisconnectReason::LoggedOut));
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        *guard = Some(cmd_tx);

        tokio::spawn(connection::run(
            self.config.clone(),
            Arc::clone(&self.credentials),
            Arc::clone(&self.bus),
            Arc::clone(&self.state),
            cmd_rx,
        ));
    }

    /// Tear down the connection along with every room membership and
    /// listener registration. Safe to call when not connected.
    pub async fn disconnect(&self) {
        let tx = self.cmd_tx.lock().ok().and_then(|mut guard| guard.take());
        if let Some(tx) = tx {
            let _ = tx.send(ChannelCommand::Shutdown).await;
        }
        self.bus.clear();
    }

    /// Join a match room. Best-effort: reported as `NotConnected` and
    /// dropped while the channel is down.
    pub async fn join_room(&self, match_id: &MatchId) -> EmitStatus {
        self.dispatch(ChannelCommand::JoinRoom(match_id.clone())).await
    }

    /// Leave a match room. Best-effort, like [`join_room`](Self::join_room).
    pub async fn leave_room(&self, match_id: &MatchId) -> EmitStatus {
        self.dispatch(ChannelCommand::LeaveRoom(match_id.clone())).await
    }

    /// Send a chat message to a match room.
    pub async fn send_message(&self, match_id: &MatchId, content: impl Into<String>) -> EmitStatus {
        self.emit(ClientEvent::SendMessage(OutgoingMessage {
            match_id: match_id.clone(),
            content: content.into(),
        }))
        .await
    }

    /// Emit an arbitrary client event frame.
    pub async fn emit(&self, event: ClientEvent) -> EmitStatus {
        self.dispatch(ChannelCommand::Emit(event)).await
    }

    /// Rooms the connection task currently considers joined. Empty when
    /// the task is not running.
    pub async fn rooms(&self) -> Vec<MatchId> {
        let Some(tx) = self.current_sender() else {
            return Vec::new();
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(ChannelCommand::Rooms(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Register a listener on this channel's event bus.
    pub fn subscribe(&self) -> (ListenerId, mpsc::UnboundedReceiver<ServerEvent>) {
        self.bus.subscribe()
    }

    /// Remove a listener registration. Idempotent.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// The event bus owned by this channel instance.
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// A watch over connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn current_sender(&self) -> Option<mpsc::Sender<ChannelCommand>> {
        self.cmd_tx.lock().ok().and_then(|guard| (*guard).clone())
    }

    async fn dispatch(&self, cmd: ChannelCommand) -> EmitStatus {
        if !self.is_connected() {
            warn!(command = ?cmd, "Realtime channel is not connected; dropping emit");
            return EmitStatus::NotConnected;
        }

        match self.current_sender() {
            Some(tx) => {
                if tx.send(cmd).await.is_ok() {
                    EmitStatus::Sent
                } else {
                    warn!("Connection task is gone; dropping emit");
                    EmitStatus::NotConnected
                }
            }
            None => {
                warn!("Realtime channel was never connected; dropping emit");
                EmitStatus::NotConnected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};
    use unveil_shared::auth::StaticCredentials;
    use unveil_shared::types::{Message, MessageId, MessageKind, UserId};

    fn test_config(url: &str) -> ChannelConfig {
        ChannelConfig {
            ws_url: url.to_string(),
            max_reconnect_attempts: 3,
            initial_reconnect_delay: Duration::from_millis(25),
            max_reconnect_delay: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    async fn bind_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (url, listener)
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(raw))) => return raw,
                Some(Ok(_)) => continue,
                other => panic!("expected a text frame, got {other:?}"),
            }
        }
    }

    fn text_message(match_id: &str, id: &str) -> ServerEvent {
        ServerEvent::NewMessage(Message {
            id: MessageId::new(id),
            match_id: MatchId::new(match_id),
            sender_id: UserId::new("user_2"),
            content: Some("hello".to_string()),
            kind: MessageKind::Text,
            voice_url: None,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_connect_join_and_receive_event() {
        let (url, listener) = bind_server().await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            let frame = next_text(&mut ws).await;
            assert_eq!(frame, r#"{"event":"joinMatchRoom","data":"match_1"}"#);

            ws.send(WsMessage::Text(
                text_message("match_1", "msg_1").to_json().unwrap(),
            ))
            .await
            .unwrap();

            // Hold the socket open until the client hangs up.
            let _ = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        });

        let channel = RealtimeChannel::new(
            test_config(&url),
            Arc::new(StaticCredentials::new("tok_1")),
        );
        let (listener_id, mut events) = channel.subscribe();

        channel.connect();
        channel
            .watch_state()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();

        assert!(channel.join_room(&MatchId::new("match_1")).await.is_sent());

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.match_id().as_str(), "match_1");

        assert_eq!(channel.rooms().await, vec![MatchId::new("match_1")]);

        channel.unsubscribe(listener_id);
        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_bearer_token_rides_the_handshake() {
        let (url, listener) = bind_server().await;
        let seen = Arc::new(Mutex::new(None::<String>));
        let seen_in_server = Arc::clone(&seen);

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = {
                let seen = Arc::clone(&seen_in_server);
                move |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
                      resp: tokio_tungstenite::tungstenite::handshake::server::Response| {
                    *seen.lock().unwrap() = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    Ok(resp)
                }
            };
            let mut ws = accept_hdr_async(tcp, callback).await.unwrap();
            let _ = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        });

        let channel = RealtimeChannel::new(
            test_config(&url),
            Arc::new(StaticCredentials::new("tok_abc")),
        );
        channel.connect();
        channel
            .watch_state()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("Bearer tok_abc"));

        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_emits_while_down_are_reported_not_thrown() {
        let channel = RealtimeChannel::new(
            test_config("ws://127.0.0.1:9"),
            Arc::new(StaticCredentials::new("tok_1")),
        );

        assert_eq!(
            channel.join_room(&MatchId::new("match_1")).await,
            EmitStatus::NotConnected
        );
        assert_eq!(
            channel.send_message(&MatchId::new("match_1"), "hi").await,
            EmitStatus::NotConnected
        );
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_connect_without_credential_is_a_noop() {
        let channel = RealtimeChannel::new(
            test_config("ws://127.0.0.1:9"),
            Arc::new(StaticCredentials::anonymous()),
        );

        channel.connect();

        assert_eq!(
            channel.state(),
            ConnectionState::Disconnected(DisconnectReason::LoggedOut)
        );
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_while_up() {
        let (url, listener) = bind_server().await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();

            // A second connect() must not open a second socket.
            let second = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
            assert!(second.is_err(), "unexpected second connection");

            // Hold the socket open until the client hangs up; a lone
            // ws.next() would mistake the keepalive ping for the hang-up.
            let _ = tokio::time::timeout(Duration::from_secs(2), async {
                while let Some(frame) = ws.next().await {
                    if frame.is_err() {
                        break;
                    }
                }
            })
            .await;
        });

        let channel = RealtimeChannel::new(
            test_config(&url),
            Arc::new(StaticCredentials::new("tok_1")),
        );
        channel.connect();
        channel
            .watch_state()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();

        channel.connect();
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(channel.is_connected());

        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_drop_reconnects_and_rejoins_rooms() {
        let (url, listener) = bind_server().await;

        let server = tokio::spawn(async move {
            // First connection: accept the join, then drop without a close
            // frame to simulate a network fault.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            assert_eq!(
                next_text(&mut ws).await,
                r#"{"event":"joinMatchRoom","data":"match_7"}"#
            );
            drop(ws);

            // The client must come back and re-enter the room on its own.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            assert_eq!(
                next_text(&mut ws).await,
                r#"{"event":"joinMatchRoom","data":"match_7"}"#
            );

            ws.send(WsMessage::Text(
                text_message("match_7", "msg_2").to_json().unwrap(),
            ))
            .await
            .unwrap();

            let _ = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        });

        let channel = RealtimeChannel::new(
            test_config(&url),
            Arc::new(StaticCredentials::new("tok_1")),
        );
        let (_listener_id, mut events) = channel.subscribe();

        channel.connect();
        channel
            .watch_state()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();
        assert!(channel.join_room(&MatchId::new("match_7")).await.is_sent());

        // Delivered only after the automatic reconnect + rejoin.
        let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.match_id().as_str(), "match_7");

        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_disables_reconnect() {
        let (url, listener) = bind_server().await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.close(None).await.unwrap();
            while let Some(frame) = ws.next().await {
                if frame.is_err() {
                    break;
                }
            }
        });

        let channel = RealtimeChannel::new(
            test_config(&url),
            Arc::new(StaticCredentials::new("tok_1")),
        );
        channel.connect();

        let mut watch = channel.watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            watch.wait_for(|s| {
                *s == ConnectionState::Disconnected(DisconnectReason::ServerClosed)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        // No reconnection follows a server-initiated close.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            channel.state(),
            ConnectionState::Disconnected(DisconnectReason::ServerClosed)
        );
        assert_eq!(
            channel.join_room(&MatchId::new("match_1")).await,
            EmitStatus::NotConnected
        );

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_a_persistent_state() {
        let config = ChannelConfig {
            ws_url: "ws://127.0.0.1:9".to_string(),
            max_reconnect_attempts: 2,
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(20),
            heartbeat_interval: Duration::from_secs(30),
        };
        let channel =
            RealtimeChannel::new(config, Arc::new(StaticCredentials::new("tok_1")));

        channel.connect();

        let mut watch = channel.watch_state();
        tokio::time::timeout(
            Duration::from_secs(3),
            watch.wait_for(|s| {
                *s == ConnectionState::Disconnected(DisconnectReason::RetriesExhausted)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(
            channel.join_room(&MatchId::new("match_1")).await,
            EmitStatus::NotConnected
        );
    }

    #[tokio::test]
    async fn test_subscription_survives_retries_exhausted() {
        // Reserve a port, then leave it closed while the retry budget
        // burns out.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ChannelConfig {
            ws_url: format!("ws://{addr}"),
            max_reconnect_attempts: 2,
            initial_reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(20),
            heartbeat_interval: Duration::from_secs(30),
        };
        let channel =
            RealtimeChannel::new(config, Arc::new(StaticCredentials::new("tok_1")));
        let (_listener_id, mut events) = channel.subscribe();

        channel.connect();
        let mut watch = channel.watch_state();
        tokio::time::timeout(
            Duration::from_secs(3),
            watch.wait_for(|s| {
                *s == ConnectionState::Disconnected(DisconnectReason::RetriesExhausted)
            }),
        )
        .await
        .unwrap()
        .unwrap();

        // The registration belongs to the channel, not to the dead task.
        assert_eq!(channel.bus().listener_count(), 1);

        // The endpoint comes back; a fresh connect() must feed the same
        // subscription.
        let listener = TcpListener::bind(addr).await.unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(WsMessage::Text(
                text_message("match_3", "msg_1").to_json().unwrap(),
            ))
            .await
            .unwrap();
            let _ = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        });

        channel.connect();
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.match_id().as_str(), "match_3");

        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_clears_listeners() {
        let (url, listener) = bind_server().await;

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let _ = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        });

        let channel = RealtimeChannel::new(
            test_config(&url),
            Arc::new(StaticCredentials::new("tok_1")),
        );
        channel.connect();
        channel
            .watch_state()
            .wait_for(|s| s.is_connected())
            .await
            .unwrap();

        let (_id, _events) = channel.subscribe();
        assert_eq!(channel.bus().listener_count(), 1);

        channel.disconnect().await;
        assert_eq!(channel.bus().listener_count(), 0);

        let mut watch = channel.watch_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            watch.wait_for(|s| *s == ConnectionState::Disconnected(DisconnectReason::Requested)),
        )
        .await
        .unwrap()
        .unwrap();

        server.await.unwrap();
    }
}
