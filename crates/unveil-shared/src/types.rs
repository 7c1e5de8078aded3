use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CHECKPOINT_1_SCORE, CHECKPOINT_2_SCORE, CHECKPOINT_3_SCORE};

// Identifiers are server-assigned opaque strings (cuid-style). The client
// never mints them; it only carries them around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a match as the server reports it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Active,
    ClosedMismatch,
    ClosedSuccess,
    Blocked,
}

impl MatchStatus {
    /// Closed states are terminal; the server never reopens a match.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedMismatch | Self::ClosedSuccess | Self::Blocked)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    Voice,
    System,
}

/// A chat message. Immutable once created; history is append-only per match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: UserId,
    /// Text body; absent for voice messages.
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Storage URL for voice messages; recording/upload happens elsewhere.
    pub voice_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One user's vibe check answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VibeChoice {
    Pending,
    Yes,
    No,
}

/// Resolved vibe check outcome, pushed by the server once it decides.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VibeOutcome {
    Pending,
    Success,
    Mismatch,
}

/// Server-owned progress record for a match. The score and checkpoint flags
/// are authoritative on the server; the client merges updates monotonically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatProgress {
    pub id: String,
    pub match_id: MatchId,
    pub score: u32,
    pub checkpoint1_reached: bool,
    pub checkpoint2_reached: bool,
    pub checkpoint3_reached: bool,
    pub user1_vibe_choice: VibeChoice,
    pub user2_vibe_choice: VibeChoice,
    pub updated_at: DateTime<Utc>,
}

impl ChatProgress {
    pub fn checkpoint_reached(&self, stage: RevealStage) -> bool {
        match stage {
            RevealStage::Name => self.checkpoint1_reached,
            RevealStage::InterestPhoto => self.checkpoint2_reached,
            RevealStage::MainPhoto => self.checkpoint3_reached,
        }
    }

    /// Fold a newer server copy into this one. Scores never regress and
    /// checkpoint flags never clear, whatever order updates arrive in.
    pub fn absorb(&mut self, incoming: &ChatProgress) {
        self.score = self.score.max(incoming.score);
        self.checkpoint1_reached |= incoming.checkpoint1_reached;
        self.checkpoint2_reached |= incoming.checkpoint2_reached;
        self.checkpoint3_reached |= incoming.checkpoint3_reached;
        if incoming.user1_vibe_choice != VibeChoice::Pending {
            self.user1_vibe_choice = incoming.user1_vibe_choice;
        }
        if incoming.user2_vibe_choice != VibeChoice::Pending {
            self.user2_vibe_choice = incoming.user2_vibe_choice;
        }
        if incoming.updated_at > self.updated_at {
            self.updated_at = incoming.updated_at;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: Option<ChatProgress>,
}

impl Match {
    /// The counterpart of `me` in this match.
    pub fn other_user(&self, me: &UserId) -> &UserId {
        if &self.user1_id == me {
            &self.user2_id
        } else {
            &self.user1_id
        }
    }
}

/// The three reveal stages, in unlock order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RevealStage {
    Name,
    InterestPhoto,
    MainPhoto,
}

impl RevealStage {
    pub fn from_stage(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Name),
            2 => Some(Self::InterestPhoto),
            3 => Some(Self::MainPhoto),
            _ => None,
        }
    }

    pub fn stage(&self) -> u8 {
        match self {
            Self::Name => 1,
            Self::InterestPhoto => 2,
            Self::MainPhoto => 3,
        }
    }

    /// Progress score at which the server unlocks this stage.
    pub fn threshold(&self) -> u32 {
        match self {
            Self::Name => CHECKPOINT_1_SCORE,
            Self::InterestPhoto => CHECKPOINT_2_SCORE,
            Self::MainPhoto => CHECKPOINT_3_SCORE,
        }
    }

    pub const ALL: [RevealStage; 3] = [Self::Name, Self::InterestPhoto, Self::MainPhoto];
}

/// What the other user has revealed so far. Sparse: each field fills in
/// exactly once, when its stage is fetched after the checkpoint unlocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RevealedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_photo_url: Option<String>,
}

impl RevealedData {
    /// Additive merge: a populated local field is never replaced by an
    /// absent or empty incoming one.
    pub fn merge(&mut self, incoming: RevealedData) {
        merge_field(&mut self.name, incoming.name);
        merge_field(&mut self.interest_photo_url, incoming.interest_photo_url);
        merge_field(&mut self.main_photo_url, incoming.main_photo_url);
    }

    pub fn field(&self, stage: RevealStage) -> Option<&str> {
        match stage {
            RevealStage::Name => self.name.as_deref(),
            RevealStage::InterestPhoto => self.interest_photo_url.as_deref(),
            RevealStage::MainPhoto => self.main_photo_url.as_deref(),
        }
    }

    pub fn is_revealed(&self, stage: RevealStage) -> bool {
        self.field(stage).is_some_and(|v| !v.is_empty())
    }
}

fn merge_field(current: &mut Option<String>, incoming: Option<String>) {
    match incoming {
        Some(v) if !v.is_empty() => *current = Some(v),
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Man,
    Woman,
    NonBinary,
    Other,
    PreferNotToSay,
}

/// Profile prompts shown before any reveal happens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub user_id: UserId,
    pub opening_question: Option<String>,
    pub communication_style: Option<String>,
    pub ama_prompt1: Option<String>,
    pub ama_prompt2: Option<String>,
    pub ama_prompt3: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub gender: Option<Gender>,
    pub preferred_genders: Option<Vec<Gender>>,
    pub age: Option<u8>,
    pub voice_intro_url: Option<String>,
    pub interest_photo_url: Option<String>,
    pub main_photo_url: Option<String>,
    pub is_verified: bool,
    pub premium_tier: Option<String>,
    pub profile: Option<Profile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_status_wire_names() {
        let json = serde_json::to_string(&MatchStatus::ClosedMismatch).unwrap();
        assert_eq!(json, "\"CLOSED_MISMATCH\"");

        let status: MatchStatus = serde_json::from_str("\"ACTIVE\"").unwrap();
        assert_eq!(status, MatchStatus::Active);
        assert!(!status.is_closed());
        assert!(MatchStatus::ClosedSuccess.is_closed());
    }

    #[test]
    fn test_message_uses_type_field_on_wire() {
        let raw = r#"{
            "id": "msg_1",
            "matchId": "match_1",
            "senderId": "user_1",
            "content": "hey",
            "type": "TEXT",
            "createdAt": "2026-01-10T12:00:00Z"
        }"#;

        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.content.as_deref(), Some("hey"));
        assert!(msg.voice_url.is_none());
    }

    #[test]
    fn test_revealed_data_merge_is_additive() {
        let mut local = RevealedData {
            name: Some("Alex".to_string()),
            ..Default::default()
        };

        local.merge(RevealedData {
            interest_photo_url: Some("https://cdn/u2/interest.jpg".to_string()),
            ..Default::default()
        });

        assert_eq!(local.name.as_deref(), Some("Alex"));
        assert_eq!(local.interest_photo_url.as_deref(), Some("https://cdn/u2/interest.jpg"));
    }

    #[test]
    fn test_revealed_data_merge_never_clears_populated_field() {
        let mut local = RevealedData {
            name: Some("Alex".to_string()),
            ..Default::default()
        };

        local.merge(RevealedData::default());
        local.merge(RevealedData {
            name: Some(String::new()),
            ..Default::default()
        });

        assert_eq!(local.name.as_deref(), Some("Alex"));
        assert!(local.is_revealed(RevealStage::Name));
        assert!(!local.is_revealed(RevealStage::MainPhoto));
    }

    #[test]
    fn test_progress_absorb_is_monotonic() {
        let older = ChatProgress {
            id: "prog_1".to_string(),
            match_id: MatchId::new("match_1"),
            score: 7,
            checkpoint1_reached: true,
            checkpoint2_reached: false,
            checkpoint3_reached: false,
            user1_vibe_choice: VibeChoice::Pending,
            user2_vibe_choice: VibeChoice::Pending,
            updated_at: Utc::now(),
        };

        let mut local = older.clone();
        local.score = 16;
        local.checkpoint2_reached = true;
        local.user1_vibe_choice = VibeChoice::Yes;

        // A stale snapshot must not undo anything.
        local.absorb(&older);

        assert_eq!(local.score, 16);
        assert!(local.checkpoint1_reached);
        assert!(local.checkpoint2_reached);
        assert_eq!(local.user1_vibe_choice, VibeChoice::Yes);
    }

    #[test]
    fn test_reveal_stage_numbering() {
        assert_eq!(RevealStage::from_stage(1), Some(RevealStage::Name));
        assert_eq!(RevealStage::from_stage(3), Some(RevealStage::MainPhoto));
        assert_eq!(RevealStage::from_stage(4), None);
        assert_eq!(RevealStage::InterestPhoto.stage(), 2);
        assert_eq!(RevealStage::MainPhoto.threshold(), 30);
    }

    #[test]
    fn test_other_user() {
        let m = Match {
            id: MatchId::new("match_1"),
            user1_id: UserId::new("user_a"),
            user2_id: UserId::new("user_b"),
            status: MatchStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            progress: None,
        };

        assert_eq!(m.other_user(&UserId::new("user_a")).as_str(), "user_b");
        assert_eq!(m.other_user(&UserId::new("user_b")).as_str(), "user_a");
    }
}
