// Client-side orchestration for Unveil: the session context plus the
// per-match chat activation machinery.

pub mod chat;
pub mod session;

use tracing_subscriber::{fmt, EnvFilter};

pub use chat::controller::{spawn_chat_session, ChatCommand, ChatSessionHandle};
pub use chat::state::{ChatClosure, ChatEvent, ChatPhase, ChatSessionState, VibeSubmission};
pub use session::{login, logout, ActiveSession, SessionContext};

/// Install the process-wide tracing subscriber.
///
/// Call once at startup. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("unveil_client=debug,unveil_realtime=debug,unveil_api=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
