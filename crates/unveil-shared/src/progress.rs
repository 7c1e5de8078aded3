// Checkpoint arithmetic. The server owns the real scoring; these helpers
// exist so the client can render progress and sanity-check pushed flags.

use crate::constants::MAX_PROGRESS_SCORE;
use crate::types::{RevealStage, VibeChoice, VibeOutcome};

/// Checkpoint flags implied by a raw score, in stage order.
pub fn checkpoints_for_score(score: u32) -> [bool; 3] {
    [
        score >= RevealStage::Name.threshold(),
        score >= RevealStage::InterestPhoto.threshold(),
        score >= RevealStage::MainPhoto.threshold(),
    ]
}

/// Highest stage a score has unlocked, if any.
pub fn highest_stage_for_score(score: u32) -> Option<RevealStage> {
    RevealStage::ALL
        .into_iter()
        .rev()
        .find(|stage| score >= stage.threshold())
}

/// Score clamped to the progress meter ceiling. The raw score keeps
/// counting on the server; only the display saturates.
pub fn display_score(score: u32) -> u32 {
    score.min(MAX_PROGRESS_SCORE)
}

/// Outcome implied by a pair of vibe choices: mutual YES succeeds, any NO
/// mismatches. Display-only; the pushed `vibeCheckUpdate` event is the
/// authority for closing a chat.
pub fn derive_outcome(a: VibeChoice, b: VibeChoice) -> VibeOutcome {
    if a == VibeChoice::No || b == VibeChoice::No {
        VibeOutcome::Mismatch
    } else if a == VibeChoice::Yes && b == VibeChoice::Yes {
        VibeOutcome::Success
    } else {
        VibeOutcome::Pending
    }
}
