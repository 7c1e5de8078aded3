use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{MatchId, Message, VibeOutcome};

/// Events the client emits over the realtime channel.
///
/// Frames are JSON text of the shape `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Enter a match's room to start receiving its events.
    #[serde(rename = "joinMatchRoom")]
    JoinMatchRoom(MatchId),

    /// Leave a match's room.
    #[serde(rename = "leaveMatchRoom")]
    LeaveMatchRoom(MatchId),

    /// Send a text message to a match.
    #[serde(rename = "sendMessage")]
    SendMessage(OutgoingMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub match_id: MatchId,
    pub content: String,
}

/// Events the server pushes to room members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message was persisted, echoed to everyone in the room including
    /// the sender.
    #[serde(rename = "newMessage")]
    NewMessage(Message),

    /// The match crossed a checkpoint threshold.
    #[serde(rename = "checkpointReached")]
    CheckpointReached(CheckpointReached),

    /// The vibe check resolved (or re-announced its state).
    #[serde(rename = "vibeCheckUpdate")]
    VibeCheckUpdate(VibeCheckUpdate),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointReached {
    pub match_id: MatchId,
    /// 1-based stage number as the server sends it.
    pub stage: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VibeCheckUpdate {
    pub match_id: MatchId,
    pub outcome: VibeOutcome,
}

impl ClientEvent {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON text frame.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The match this event belongs to. Consumers filter on this.
    pub fn match_id(&self) -> &MatchId {
        match self {
            Self::NewMessage(msg) => &msg.match_id,
            Self::CheckpointReached(c) => &c.match_id,
            Self::VibeCheckUpdate(v) => &v.match_id,
        }
    }
}
