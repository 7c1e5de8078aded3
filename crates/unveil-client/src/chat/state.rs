//! Pure state machine for one chat activation.
//!
//! Every mutation flows through [`ChatSessionState::apply`]; the
//! controller task owns the value and publishes snapshots over a watch
//! channel. Transitions are synchronous and side-effect free, so every
//! rule in here is testable without a server or a socket.

use tracing::{debug, warn};

use unveil_shared::progress;
use unveil_shared::{
    ChatProgress, Match, MatchId, MatchStatus, Message, RevealStage, RevealedData, ServerEvent,
    UserId, VibeChoice, VibeOutcome,
};

/// Lifecycle phase of a chat activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    /// History and progress are still being fetched.
    Loading,
    /// Open for messaging, reveals, and the vibe check.
    Ready,
    /// The match reached a terminal outcome. Never leaves this phase.
    Closed(ChatClosure),
}

/// Terminal outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatClosure {
    /// Both sides said yes. Identities unlock fully and the chat stays
    /// usable.
    Success,
    /// Someone said no, or the match was blocked. The chat freezes
    /// read-only.
    Mismatch,
}

/// Where the signed-in user's one-shot vibe decision stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VibeSubmission {
    NotSubmitted,
    /// Choice sent (or already recorded server-side); outcome not
    /// announced yet.
    Awaiting,
    /// Outcome announced. The phase says which one.
    Resolved,
}

/// Everything that can change a [`ChatSessionState`].
#[derive(Debug)]
pub enum ChatEvent {
    /// The initial history and progress fetch finished.
    Loaded {
        messages: Vec<Message>,
        progress: Option<ChatProgress>,
    },
    /// The initial fetch failed. The activation stays in `Loading`; the
    /// host shows `load_error` and retries by reactivating.
    LoadFailed(String),
    /// A frame pushed over the realtime channel.
    Push(ServerEvent),
    /// A reveal fetch came back with data.
    RevealFetched(RevealedData),
    /// A reveal fetch failed outright (not a lock refusal).
    RevealFailed(String),
    /// The user's vibe choice passed the local gate and is on its way
    /// to the server.
    VibeSubmitted(VibeChoice),
    /// The vibe submission was rejected in transit; the choice reopens.
    VibeFailed(String),
}

/// Snapshot of one chat activation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSessionState {
    /// Match this activation belongs to. Pushes for any other match are
    /// ignored.
    pub match_id: MatchId,
    /// The signed-in user. Messages with this sender render as "mine".
    pub me: UserId,
    user1_id: UserId,
    initial_closure: Option<ChatClosure>,
    pub phase: ChatPhase,
    /// Messages in arrival order.
    pub messages: Vec<Message>,
    /// Raw progress score. Show it through [`display_score`](Self::display_score).
    pub score: u32,
    pub checkpoint1_reached: bool,
    pub checkpoint2_reached: bool,
    pub checkpoint3_reached: bool,
    /// Identity fields unlocked so far.
    pub revealed: RevealedData,
    /// The signed-in user's recorded choice.
    pub my_choice: VibeChoice,
    /// The other side's choice as of the last load. Resolution arrives
    /// through the phase, not through this field.
    pub their_choice: VibeChoice,
    pub vibe: VibeSubmission,
    /// Set when the initial fetch failed; cleared by a successful load.
    pub load_error: Option<String>,
    /// Most recent failed user action, for surfacing in the UI. Cleared
    /// when a later action succeeds.
    pub last_error: Option<String>,
}

impl ChatSessionState {
    /// Fresh `Loading` state for one activation of `active`.
    pub fn new(active: &Match, me: UserId) -> Self {
        let initial_closure = match active.status {
            MatchStatus::ClosedSuccess => Some(ChatClosure::Success),
            MatchStatus::ClosedMismatch | MatchStatus::Blocked => Some(ChatClosure::Mismatch),
            MatchStatus::Pending | MatchStatus::Active => None,
        };

        Self {
            match_id: active.id.clone(),
            me,
            user1_id: active.user1_id.clone(),
            initial_closure,
            phase: ChatPhase::Loading,
            messages: Vec::new(),
            score: 0,
            checkpoint1_reached: false,
            checkpoint2_reached: false,
            checkpoint3_reached: false,
            revealed: RevealedData::default(),
            my_choice: VibeChoice::Pending,
            their_choice: VibeChoice::Pending,
            vibe: VibeSubmission::NotSubmitted,
            load_error: None,
            last_error: None,
        }
    }

    // ─── Queries ───

    /// True once the given stage's checkpoint has been crossed.
    pub fn checkpoint_reached(&self, stage: RevealStage) -> bool {
        match stage {
            RevealStage::Name => self.checkpoint1_reached,
            RevealStage::InterestPhoto => self.checkpoint2_reached,
            RevealStage::MainPhoto => self.checkpoint3_reached,
        }
    }

    /// Score as shown to the user, capped at the display ceiling.
    pub fn display_score(&self) -> u32 {
        progress::display_score(self.score)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, ChatPhase::Closed(_))
    }

    /// Messaging is open while `Ready` and stays open after a successful
    /// close. A mismatch freezes it.
    pub fn can_send(&self) -> bool {
        matches!(
            self.phase,
            ChatPhase::Ready | ChatPhase::Closed(ChatClosure::Success)
        )
    }

    /// A reveal fetch is worth issuing when the stage's checkpoint is
    /// crossed and the field has not been fetched yet.
    pub fn can_request_reveal(&self, stage: RevealStage) -> bool {
        match self.phase {
            ChatPhase::Loading | ChatPhase::Closed(ChatClosure::Mismatch) => false,
            ChatPhase::Ready | ChatPhase::Closed(ChatClosure::Success) => {
                self.checkpoint_reached(stage) && !self.revealed.is_revealed(stage)
            }
        }
    }

    /// The vibe check opens at the third checkpoint and accepts exactly
    /// one submission.
    pub fn can_submit_vibe(&self) -> bool {
        self.phase == ChatPhase::Ready
            && self.checkpoint3_reached
            && self.vibe == VibeSubmission::NotSubmitted
    }

    // ─── Transitions ───

    /// Advance the state by one event.
    ///
    /// Total over its input: events that make no sense in the current
    /// phase are logged and dropped, never a panic.
    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Loaded { messages, progress } => self.on_loaded(messages, progress),
            ChatEvent::LoadFailed(message) => {
                self.load_error = Some(message);
            }
            ChatEvent::Push(event) => self.on_push(event),
            ChatEvent::RevealFetched(data) => self.on_reveal(data),
            ChatEvent::RevealFailed(message) => {
                self.last_error = Some(message);
            }
            ChatEvent::VibeSubmitted(choice) => self.on_vibe_submitted(choice),
            ChatEvent::VibeFailed(message) => self.on_vibe_failed(message),
        }
    }

    fn on_loaded(&mut self, messages: Vec<Message>, progress: Option<ChatProgress>) {
        if self.phase != ChatPhase::Loading {
            debug!(match_id = %self.match_id, "Duplicate load result ignored");
            return;
        }

        self.messages = messages;
        self.load_error = None;

        if let Some(row) = progress {
            self.score = row.score;
            self.checkpoint1_reached = row.checkpoint1_reached;
            self.checkpoint2_reached = row.checkpoint2_reached;
            self.checkpoint3_reached = row.checkpoint3_reached;
            if self.user1_id == self.me {
                self.my_choice = row.user1_vibe_choice;
                self.their_choice = row.user2_vibe_choice;
            } else {
                self.my_choice = row.user2_vibe_choice;
                self.their_choice = row.user1_vibe_choice;
            }
        }

        // A closed match status wins; otherwise the recorded choices may
        // already determine the outcome on their own.
        self.phase = if let Some(closure) = self.initial_closure {
            ChatPhase::Closed(closure)
        } else {
            match progress::derive_outcome(self.my_choice, self.their_choice) {
                VibeOutcome::Success => ChatPhase::Closed(ChatClosure::Success),
                VibeOutcome::Mismatch => ChatPhase::Closed(ChatClosure::Mismatch),
                VibeOutcome::Pending => ChatPhase::Ready,
            }
        };

        self.vibe = if self.is_closed() {
            VibeSubmission::Resolved
        } else if self.my_choice != VibeChoice::Pending {
            VibeSubmission::Awaiting
        } else {
            VibeSubmission::NotSubmitted
        };
    }

    fn on_push(&mut self, event: ServerEvent) {
        if event.match_id() != &self.match_id {
            debug!(
                match_id = %self.match_id,
                other = %event.match_id(),
                "Push for another match ignored"
            );
            return;
        }

        if self.phase == ChatPhase::Loading {
            debug!(match_id = %self.match_id, "Push before load finished ignored");
            return;
        }

        if self.phase == ChatPhase::Closed(ChatClosure::Mismatch) {
            debug!(match_id = %self.match_id, "Chat is closed; push ignored");
            return;
        }

        match event {
            ServerEvent::NewMessage(message) => self.on_message(message),
            ServerEvent::CheckpointReached(c) => self.on_checkpoint(c.stage),
            ServerEvent::VibeCheckUpdate(update) => self.on_vibe_update(update.outcome),
        }
    }

    fn on_message(&mut self, message: Message) {
        // The server echoes sends back to the sender, and a reconnect can
        // replay frames. Duplicate message ids are expected (ignore).
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(
                match_id = %self.match_id,
                message_id = %message.id,
                "Duplicate message ignored"
            );
            return;
        }

        // Arrival order is display order; the server assigns no sequence
        // numbers.
        self.messages.push(message);
    }

    fn on_checkpoint(&mut self, stage: u8) {
        if self.phase != ChatPhase::Ready {
            debug!(match_id = %self.match_id, stage, "Checkpoint push outside an open chat ignored");
            return;
        }

        let Some(stage) = RevealStage::from_stage(stage) else {
            warn!(match_id = %self.match_id, stage, "Unknown checkpoint stage ignored");
            return;
        };

        match stage {
            RevealStage::Name => self.checkpoint1_reached = true,
            RevealStage::InterestPhoto => self.checkpoint2_reached = true,
            RevealStage::MainPhoto => self.checkpoint3_reached = true,
        }

        // The push carries no score. Raise ours to at least the threshold
        // the server just certified; a fresher loaded score stays put.
        self.score = self.score.max(stage.threshold());
    }

    fn on_vibe_update(&mut self, outcome: VibeOutcome) {
        // The closed phase is terminal; a late or contradictory update
        // cannot rewrite it.
        if self.is_closed() {
            debug!(match_id = %self.match_id, "Vibe update after close ignored");
            return;
        }

        match outcome {
            VibeOutcome::Pending => {
                debug!(match_id = %self.match_id, "Pending vibe update ignored");
            }
            VibeOutcome::Success => self.close(ChatClosure::Success),
            VibeOutcome::Mismatch => self.close(ChatClosure::Mismatch),
        }
    }

    fn close(&mut self, closure: ChatClosure) {
        self.phase = ChatPhase::Closed(closure);
        self.vibe = VibeSubmission::Resolved;
    }

    fn on_reveal(&mut self, data: RevealedData) {
        if matches!(
            self.phase,
            ChatPhase::Loading | ChatPhase::Closed(ChatClosure::Mismatch)
        ) {
            debug!(match_id = %self.match_id, "Reveal result ignored in this phase");
            return;
        }

        self.revealed.merge(data);
        self.last_error = None;
    }

    fn on_vibe_submitted(&mut self, choice: VibeChoice) {
        if choice == VibeChoice::Pending || !self.can_submit_vibe() {
            debug!(
                match_id = %self.match_id,
                choice = ?choice,
                "Vibe submission not accepted in this state"
            );
            return;
        }

        self.my_choice = choice;
        self.vibe = VibeSubmission::Awaiting;
        self.last_error = None;
    }

    fn on_vibe_failed(&mut self, message: String) {
        // Reopen the choice only if nothing resolved in the meantime; a
        // push can land between the submit and its failed response.
        if self.vibe == VibeSubmission::Awaiting && self.phase == ChatPhase::Ready {
            self.my_choice = VibeChoice::Pending;
            self.vibe = VibeSubmission::NotSubmitted;
        }
        self.last_error = Some(message);
    }
}
