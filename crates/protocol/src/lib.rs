//! Wire protocol for the ApplyFlow realtime session channel.
//!
//! Both realtime surfaces (assistant chat and the notification feed)
//! exchange JSON frames over a persistent WebSocket. This crate defines
//! the frame shapes, the shared records they carry, and the protocol
//! constants. It contains no I/O.

pub mod constants;
pub mod directory;
pub mod frames;
pub mod types;

// Re-export primary types for convenience.
pub use frames::{ClientFrame, ServerFrame, UnreadPayload};
pub use types::{
    ChatMessage, NotificationPriority, NotificationRecord, Role, SessionIdentity,
};
