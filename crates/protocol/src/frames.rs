//! JSON frames exchanged over the realtime channel.
//!
//! Outbound frames are tagged by `action`, inbound frames by `type`.
//! The transport preserves ordering; frames are interpreted strictly
//! in arrival order.

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, NotificationRecord};

/// Client → server action frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Initiation/subscribe handshake, sent first on every fresh
    /// connection. Carries the session to resume, if any.
    #[serde(rename_all = "camelCase")]
    Init {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// A user chat message.
    #[serde(rename_all = "camelCase")]
    Message {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
    },

    /// Clears the current session and starts a new one.
    #[serde(rename_all = "camelCase")]
    Clear {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Switches the active session.
    #[serde(rename_all = "camelCase")]
    Switch { session_id: String },

    /// Keepalive pulse. No payload, no reply expected.
    Ping,

    /// Marks a notification as read.
    #[serde(rename_all = "camelCase")]
    Acknowledge { notification_id: String },
}

/// Bulk unread-notification payload wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadPayload {
    pub notifications: Vec<NotificationRecord>,
}

/// Server → client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Announces the active session, optionally replaying its history.
    #[serde(rename_all = "camelCase")]
    Session {
        session_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        messages: Option<Vec<ChatMessage>>,
    },

    /// One incremental content fragment of an in-flight assistant message.
    #[serde(rename_all = "camelCase")]
    Token { message_id: String, content: String },

    /// Ends the in-flight stream. When `content` is present it is the
    /// authoritative final text, replacing the accumulated fragments.
    Complete {
        #[serde(default)]
        content: Option<String>,
    },

    /// A protocol-level error, human readable.
    Error { content: String },

    /// A single pushed notification.
    Notification { payload: NotificationRecord },

    /// Bulk replay of unread notifications after subscribe.
    UnreadNotifications { data: UnreadPayload },
}
