// Shared domain types, wire protocol, and progress arithmetic for the
// Unveil client crates.

pub mod auth;
pub mod constants;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod types;

pub use auth::{CredentialProvider, StaticCredentials};
pub use error::ProtocolError;
pub use progress::{checkpoints_for_score, derive_outcome, display_score, highest_stage_for_score};
pub use protocol::{CheckpointReached, ClientEvent, OutgoingMessage, ServerEvent, VibeCheckUpdate};
pub use types::{
    ChatProgress, Gender, Match, MatchId, MatchStatus, Message, MessageId, MessageKind, Profile,
    RevealStage, RevealedData, User, UserId, VibeChoice, VibeOutcome,
};
