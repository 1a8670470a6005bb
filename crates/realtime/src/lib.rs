//! Realtime session client for ApplyFlow surfaces.
//!
//! One shared component behind both the assistant chat panel and the
//! notification feed: it owns the WebSocket lifecycle, reconnects with
//! bounded exponential backoff, performs the init/subscribe handshake,
//! reassembles streamed assistant content, and keeps the connection
//! alive with a periodic ping frame. UI code consumes it through
//! [`RealtimeClient`].

pub mod client;
pub mod directory;
pub(crate) mod handler;
pub mod inbox;
pub(crate) mod pumps;
pub mod reassembly;
pub(crate) mod reconnection;
pub mod socket;
pub mod types;

pub use client::RealtimeClient;
pub use directory::{DirectoryError, SessionDirectory};
pub use inbox::NotificationInbox;
pub use reassembly::StreamReassembler;
pub use socket::{ClientError, Socket};
pub use types::{ClientConfig, ClientEvent, ConnectionState, ReconnectConfig};
