/// Application name
pub const APP_NAME: &str = "Unveil";

/// Progress score that unlocks checkpoint 1 (name reveal)
pub const CHECKPOINT_1_SCORE: u32 = 5;

/// Progress score that unlocks checkpoint 2 (interest photo reveal)
pub const CHECKPOINT_2_SCORE: u32 = 15;

/// Progress score that unlocks checkpoint 3 (main photo reveal + vibe check)
pub const CHECKPOINT_3_SCORE: u32 = 30;

/// Ceiling for the progress meter; the raw score may keep growing past it
pub const MAX_PROGRESS_SCORE: u32 = 40;

/// Automatic reconnection attempts before the channel stays down
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// First reconnect delay; doubles per attempt
pub const INITIAL_RECONNECT_DELAY_MS: u64 = 1_000;

/// Reconnect delay cap
pub const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// WebSocket keepalive ping interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Bounded command channel capacity
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Default HTTP API base URL (development server)
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api";

/// Default realtime endpoint (development server)
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws";

/// Default HTTP request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
