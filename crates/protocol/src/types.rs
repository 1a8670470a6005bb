//! Shared records carried by realtime frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a session's ordered history.
///
/// Insertion order is display order. A `user` message is immutable once
/// sent. An `assistant` message starts as an empty placeholder with
/// `is_streaming = true` and grows monotonically until a `complete`
/// frame finalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    /// A locally authored user message.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            is_streaming: false,
        }
    }

    /// An empty assistant placeholder awaiting streamed content.
    pub fn streaming_placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: String::new(),
            is_streaming: true,
        }
    }
}

/// The currently active conversation context.
///
/// Created by the backend and echoed on handshake completion; replaced
/// wholesale on session switch, cleared on an explicit new/clear action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub session_id: Option<String>,
    pub title: Option<String>,
}

impl SessionIdentity {
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
    }
}

/// Display priority of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A push notification, independent of any session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: String,
    /// Server-defined category, e.g. `"application_update"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: NotificationPriority,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
