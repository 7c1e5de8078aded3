//! Connection task internals: authenticated connect, the session select
//! loop, and reconnection with capped exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use unveil_shared::auth::CredentialProvider;
use unveil_shared::protocol::{ClientEvent, ServerEvent};

use crate::bus::EventBus;
use crate::channel::{ChannelCommand, ChannelConfig, ConnectionState, DisconnectReason};
use crate::rooms::RoomTracker;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// How one connected session ended.
enum SessionEnd {
    /// Local shutdown request; no reconnection.
    Shutdown,
    /// The server sent a close frame; no reconnection.
    ServerClosed,
    /// Network fault; eligible for reconnection.
    Transient,
}

/// Body of the connection task. Owns the room tracker for the whole task
/// lifetime so memberships survive transient drops.
pub(crate) async fn run(
    config: ChannelConfig,
    credentials: Arc<dyn CredentialProvider>,
    bus: Arc<EventBus>,
    state: Arc<watch::Sender<ConnectionState>>,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
) {
    let mut rooms = RoomTracker::new();
    let mut attempts: u32 = 0;
    let mut delay = config.initial_reconnect_delay;

    let reason = loop {
        // The credential can disappear mid-retry (logout); stop quietly.
        let Some(token) = credentials.bearer_token() else {
            info!("Credential gone; realtime channel stays down");
            break DisconnectReason::LoggedOut;
        };

        state.send_replace(ConnectionState::Connecting);

        let stream = match open_socket(&config.ws_url, &token).await {
            Ok(stream) => stream,
            Err(error) => {
                attempts += 1;
                warn!(error = %error, attempt = attempts, "Realtime connect failed");
                if attempts >= config.max_reconnect_attempts {
                    break DisconnectReason::RetriesExhausted;
                }
                state.send_replace(ConnectionState::Disconnected(DisconnectReason::Transient));
                if wait_before_retry(delay, &mut cmd_rx, &rooms).await {
                    break DisconnectReason::Requested;
                }
                delay = (delay * 2).min(config.max_reconnect_delay);
                continue;
            }
        };

        info!(url = %config.ws_url, "Realtime channel connected");
        attempts = 0;
        delay = config.initial_reconnect_delay;
        state.send_replace(ConnectionState::Connected);

        match run_session(stream, &mut rooms, &bus, &mut cmd_rx, config.heartbeat_interval).await {
            SessionEnd::Shutdown => break DisconnectReason::Requested,
            SessionEnd::ServerClosed => break DisconnectReason::ServerClosed,
            SessionEnd::Transient => {
                state.send_replace(ConnectionState::Disconnected(DisconnectReason::Transient));
                if wait_before_retry(delay, &mut cmd_rx, &rooms).await {
                    break DisconnectReason::Requested;
                }
                delay = (delay * 2).min(config.max_reconnect_delay);
            }
        }
    };

    // Memberships die with the task; listener registrations do not. The
    // bus belongs to the channel handle and only an explicit disconnect()
    // clears it, so a later connect() feeds the same subscribers.
    rooms.clear();
    // Close the command channel before publishing the final state, so a
    // caller that observes the state can immediately connect() again.
    drop(cmd_rx);
    state.send_replace(ConnectionState::Disconnected(reason));
    info!(reason = ?reason, "Realtime channel task ended");
}

/// One connected session: rejoin tracked rooms, then pump commands,
/// inbound frames, and the keepalive until something ends it.
async fn run_session(
    stream: WsStream,
    rooms: &mut RoomTracker,
    bus: &EventBus,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    heartbeat_interval: Duration,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();

    // Rooms joined before a transient drop are re-entered explicitly; the
    // server does not restore memberships on its own.
    for match_id in rooms.joined_rooms() {
        info!(room = %match_id, "Rejoining match room");
        if send_frame(&mut sink, &ClientEvent::JoinMatchRoom(match_id))
            .await
            .is_err()
        {
            return SessionEnd::Transient;
        }
    }

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::JoinRoom(match_id)) => {
                    rooms.on_joined(match_id.clone());
                    debug!(room = %match_id, "Joining match room");
                    if send_frame(&mut sink, &ClientEvent::JoinMatchRoom(match_id)).await.is_err() {
                        return SessionEnd::Transient;
                    }
                }
                Some(ChannelCommand::LeaveRoom(match_id)) => {
                    rooms.on_left(&match_id);
                    debug!(room = %match_id, "Leaving match room");
                    if send_frame(&mut sink, &ClientEvent::LeaveMatchRoom(match_id)).await.is_err() {
                        return SessionEnd::Transient;
                    }
                }
                Some(ChannelCommand::Emit(event)) => {
                    if send_frame(&mut sink, &event).await.is_err() {
                        return SessionEnd::Transient;
                    }
                }
                Some(ChannelCommand::Rooms(reply)) => {
                    let _ = reply.send(rooms.joined_rooms());
                }
                Some(ChannelCommand::Shutdown) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },

            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(raw))) => match ServerEvent::from_json(&raw) {
                    Ok(event) => {
                        debug!(match_id = %event.match_id(), "Server event received");
                        bus.publish(&event);
                    }
                    // Unknown or malformed frames are logged and skipped,
                    // never fatal to the connection.
                    Err(error) => warn!(error = %error, "Dropping malformed frame"),
                },
                Some(Ok(WsMessage::Ping(payload))) => {
                    if sink.send(WsMessage::Pong(payload)).await.is_err() {
                        return SessionEnd::Transient;
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Binary(_))) => debug!("Ignoring binary frame"),
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(frame = ?frame, "Server closed the realtime connection");
                    return SessionEnd::ServerClosed;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(error = %error, "Realtime stream error");
                    return SessionEnd::Transient;
                }
                None => {
                    info!("Realtime stream ended");
                    return SessionEnd::Transient;
                }
            },

            _ = heartbeat.tick() => {
                if sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    return SessionEnd::Transient;
                }
            }
        }
    }
}

/// Open the socket with the bearer credential on the upgrade request,
/// mirroring how the HTTP side authenticates.
async fn open_socket(ws_url: &str, token: &str) -> anyhow::Result<WsStream> {
    let mut request = ws_url.into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

async fn send_frame(sink: &mut WsSink, event: &ClientEvent) -> anyhow::Result<()> {
    let frame = event.to_json()?;
    sink.send(WsMessage::Text(frame)).await?;
    Ok(())
}

/// Sleep out the backoff (plus jitter) while still honoring shutdown and
/// introspection commands. Returns true when a shutdown arrived.
async fn wait_before_retry(
    delay: Duration,
    cmd_rx: &mut mpsc::Receiver<ChannelCommand>,
    rooms: &RoomTracker,
) -> bool {
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 4));
    let sleep = tokio::time::sleep(delay + jitter);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCommand::Rooms(reply)) => {
                    let _ = reply.send(rooms.joined_rooms());
                }
                Some(ChannelCommand::Shutdown) | None => return true,
                Some(cmd) => debug!(command = ?cmd, "Dropping command while reconnecting"),
            },
        }
    }
}
