//! Controller task for one chat activation.
//!
//! Each activated match gets its own spawned task that owns the
//! [`ChatSessionState`]: it joins the room, loads history and progress,
//! folds pushed frames and host commands into the state, and publishes
//! every change over a watch channel. Gates are checked against the
//! state before any I/O, so locked reveals and repeat vibe submissions
//! never reach the network.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use unveil_api::{ApiClient, ApiError};
use unveil_realtime::RealtimeChannel;
use unveil_shared::{ChatProgress, Match, MatchId, Message, RevealStage, UserId, VibeChoice};

use crate::chat::state::{ChatEvent, ChatSessionState};

/// What the host can ask an activated chat to do.
#[derive(Debug)]
pub enum ChatCommand {
    /// Send a text message to the room.
    SendMessage(String),
    /// Fetch one reveal stage, if it is unlocked and still unfetched.
    RequestReveal(RevealStage),
    /// Submit the one-shot vibe decision.
    SubmitVibe(VibeChoice),
    /// Leave the room and end the activation.
    Deactivate,
}

/// Host-side handle to a running chat activation.
///
/// Dropping the handle ends the activation the same way
/// [`ChatCommand::Deactivate`] does.
pub struct ChatSessionHandle {
    commands: mpsc::Sender<ChatCommand>,
    state: watch::Receiver<ChatSessionState>,
}

impl ChatSessionHandle {
    /// Snapshot of the current state.
    pub fn state(&self) -> ChatSessionState {
        self.state.borrow().clone()
    }

    /// A watch over every state change.
    pub fn watch(&self) -> watch::Receiver<ChatSessionState> {
        self.state.clone()
    }

    pub async fn send_message(&self, content: impl Into<String>) {
        let _ = self
            .commands
            .send(ChatCommand::SendMessage(content.into()))
            .await;
    }

    pub async fn request_reveal(&self, stage: RevealStage) {
        let _ = self.commands.send(ChatCommand::RequestReveal(stage)).await;
    }

    pub async fn submit_vibe(&self, choice: VibeChoice) {
        let _ = self.commands.send(ChatCommand::SubmitVibe(choice)).await;
    }

    pub async fn deactivate(&self) {
        let _ = self.commands.send(ChatCommand::Deactivate).await;
    }
}

/// Activate a chat for `active`, owned by a spawned task.
///
/// The task joins the match room, loads history and progress, then
/// serves commands and pushed events until deactivated. State begins in
/// `Loading` and is observable immediately through the handle.
pub fn spawn_chat_session(
    api: ApiClient,
    channel: Arc<RealtimeChannel>,
    active: Match,
    me: UserId,
) -> ChatSessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(ChatSessionState::new(&active, me));

    tokio::spawn(run(api, channel, active.id, cmd_rx, state_tx));

    ChatSessionHandle {
        commands: cmd_tx,
        state: state_rx,
    }
}

async fn run(
    api: ApiClient,
    channel: Arc<RealtimeChannel>,
    match_id: MatchId,
    mut commands: mpsc::Receiver<ChatCommand>,
    state: watch::Sender<ChatSessionState>,
) {
    // Subscribe before joining so nothing pushed slips past the load;
    // frames arriving during the fetch queue up and apply right after it.
    let (listener_id, mut events) = channel.subscribe();
    let mut conn = channel.watch_state();
    channel.join_room(&match_id).await;

    info!(match_id = %match_id, "Chat session activated");

    match load_initial(&api, &match_id).await {
        Ok((messages, progress)) => {
            state.send_modify(|s| s.apply(ChatEvent::Loaded { messages, progress }));
        }
        Err(err) => {
            warn!(match_id = %match_id, error = %err, "Initial chat load failed");
            state.send_modify(|s| s.apply(ChatEvent::LoadFailed(err.to_string())));
        }
    }

    let mut events_open = true;
    let mut conn_open = true;
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ChatCommand::SendMessage(content)) => {
                        let allowed = state.borrow().can_send();
                        if !allowed {
                            debug!(match_id = %match_id, "Chat not open for sending; message dropped");
                        } else if !channel.send_message(&match_id, content).await.is_sent() {
                            warn!(match_id = %match_id, "Realtime channel down; message dropped");
                        }
                    }
                    Some(ChatCommand::RequestReveal(stage)) => {
                        let allowed = state.borrow().can_request_reveal(stage);
                        if !allowed {
                            debug!(
                                match_id = %match_id,
                                stage = stage.stage(),
                                "Reveal not requestable; no-op"
                            );
                        } else {
                            fetch_reveal(&api, &match_id, stage, &state).await;
                        }
                    }
                    Some(ChatCommand::SubmitVibe(choice)) => {
                        let allowed = state.borrow().can_submit_vibe();
                        if choice == VibeChoice::Pending || !allowed {
                            debug!(
                                match_id = %match_id,
                                choice = ?choice,
                                "Vibe submission gated off; no-op"
                            );
                        } else {
                            // Flip to Awaiting first so a repeat submit
                            // bounces even while this request is in flight.
                            state.send_modify(|s| s.apply(ChatEvent::VibeSubmitted(choice)));
                            if let Err(err) = api.submit_vibe(&match_id, choice).await {
                                warn!(match_id = %match_id, error = %err, "Vibe submission failed");
                                state.send_modify(|s| s.apply(ChatEvent::VibeFailed(err.to_string())));
                            }
                        }
                    }
                    // A dropped handle deactivates just like the command.
                    Some(ChatCommand::Deactivate) | None => break,
                }
            }
            event = events.recv(), if events_open => {
                match event {
                    Some(event) => state.send_modify(|s| s.apply(ChatEvent::Push(event))),
                    None => {
                        // The channel tore its bus down (disconnect or
                        // logout). HTTP-backed commands keep working.
                        debug!(match_id = %match_id, "Push stream ended");
                        events_open = false;
                    }
                }
            }
            changed = conn.changed(), if conn_open => {
                if changed.is_err() {
                    conn_open = false;
                } else if conn.borrow_and_update().is_connected() {
                    // The channel drops frames emitted while it was down
                    // instead of buffering them, so every fresh connection
                    // needs an explicit join.
                    debug!(match_id = %match_id, "Channel up; joining match room");
                    channel.join_room(&match_id).await;
                }
            }
        }
    }

    channel.leave_room(&match_id).await;
    channel.unsubscribe(listener_id);
    info!(match_id = %match_id, "Chat session deactivated");
}

async fn fetch_reveal(
    api: &ApiClient,
    match_id: &MatchId,
    stage: RevealStage,
    state: &watch::Sender<ChatSessionState>,
) {
    match api.fetch_reveal(match_id, stage).await {
        Ok(Some(data)) => {
            state.send_modify(|s| s.apply(ChatEvent::RevealFetched(data)));
        }
        // Still locked server-side; the client's flags were ahead.
        Ok(None) => {}
        Err(err) => {
            warn!(match_id = %match_id, error = %err, "Reveal fetch failed");
            state.send_modify(|s| s.apply(ChatEvent::RevealFailed(err.to_string())));
        }
    }
}

async fn load_initial(
    api: &ApiClient,
    match_id: &MatchId,
) -> Result<(Vec<Message>, Option<ChatProgress>), ApiError> {
    let messages = api.match_messages(match_id).await?;
    let progress = api.match_progress(match_id).await?;
    Ok((messages, progress))
}
