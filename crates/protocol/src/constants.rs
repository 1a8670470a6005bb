use std::time::Duration;

/// Origin-relative WebSocket path for the assistant chat channel.
pub const CHAT_ENDPOINT_PATH: &str = "/ws/chat";

/// Origin-relative WebSocket path for the notification feed.
pub const NOTIFICATIONS_ENDPOINT_PATH: &str = "/ws/notifications";

/// How often a connected client emits a keepalive ping frame.
///
/// No response is required; the pulse exists so intermediaries don't
/// drop the connection as idle.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Maximum inbound frame size in bytes (1 MB).
///
/// Session replays carry full message history; anything larger than
/// this is malformed and dropped.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
