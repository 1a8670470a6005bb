//! Public types for the realtime client.

use std::time::Duration;

use applyflow_protocol::constants::{CHAT_ENDPOINT_PATH, NOTIFICATIONS_ENDPOINT_PATH};
use applyflow_protocol::directory::SessionSummary;
use applyflow_protocol::types::NotificationRecord;

/// Lifecycle state of the single duplex connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport. Either never connected, or lost/torn down.
    Disconnected,
    /// Transport opening, handshake not yet sent.
    Connecting,
    /// Connected; handshake sent, frames flowing.
    Open,
    /// User-initiated teardown in progress.
    Closing,
}

/// Events emitted by the client for the owning UI layer.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A reconnect attempt is scheduled after an abnormal close.
    Reconnecting { attempt: u32, next_retry: Duration },
    /// The active session changed (handshake completed or session switched).
    SessionChanged {
        session_id: String,
        title: Option<String>,
    },
    /// The message sequence changed (send, token, history replay, clear).
    MessagesUpdated,
    /// The in-flight assistant stream finished.
    StreamFinished,
    /// The server reported a protocol-level error. The connection stays up.
    ServerError(String),
    /// A single notification was pushed.
    NotificationReceived(NotificationRecord),
    /// Unread notifications were bulk-synced; `unread` is the new count.
    UnreadSynced { unread: usize },
    /// Fresh session-list metadata from the session directory.
    SessionList(Vec<SessionSummary>),
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Attempt ceiling. Once reached the client stays Disconnected
    /// until an explicit facade action reconnects.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a given attempt number (0-based): `min(base * 2^n, cap)`.
    ///
    /// Deliberately jitter-free so callers can reason about exact retry
    /// timing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.min(31);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exp);
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Configuration for a realtime client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full WebSocket URL, e.g. `wss://host/ws/chat`.
    pub url: String,
    /// Identity sent in the init/subscribe handshake. A client with an
    /// empty user id never connects.
    pub user_id: String,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: user_id.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Chat endpoint URL under the given base, e.g. `wss://host`.
    pub fn chat_url(base: &str) -> String {
        format!("{base}{CHAT_ENDPOINT_PATH}")
    }

    /// Notification-feed endpoint URL under the given base.
    pub fn notifications_url(base: &str) -> String {
        format!("{base}{NOTIFICATIONS_ENDPOINT_PATH}")
    }
}
