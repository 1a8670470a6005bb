//! Single WebSocket connection to a realtime endpoint.
//!
//! Owns the read/write/ping pump tasks for one transport handle and
//! exposes frame send plus frame/disconnect callbacks. Connection
//! lifecycle policy (reconnects, handshakes) lives above this layer.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;

use applyflow_protocol::constants::MAX_FRAME_SIZE;
use applyflow_protocol::frames::ClientFrame;
use applyflow_protocol::frames::ServerFrame;

use crate::pumps::write::Outbound;

/// Errors from the realtime client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection closed")]
    Closed,
}

/// Callback type for inbound server frames.
pub type FrameCallback = Box<dyn Fn(ServerFrame) + Send + Sync>;

pub(crate) type SharedFrameCallback = Arc<Mutex<Option<FrameCallback>>>;

/// Callback type for disconnect notification.
pub(crate) type DisconnectCallback = Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

/// One open WebSocket connection.
///
/// Dropping the socket aborts its pump tasks; prefer [`Socket::close`]
/// for a graceful shutdown that sends a close frame.
pub struct Socket {
    write_tx: mpsc::Sender<Outbound>,
    on_frame: SharedFrameCallback,
    on_disconnect: DisconnectCallback,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

impl Socket {
    /// Opens the transport and starts the pump tasks.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_SIZE);
        ws_config.max_frame_size = Some(MAX_FRAME_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<Outbound>(256);
        let on_frame: SharedFrameCallback = Arc::new(Mutex::new(None));
        let on_disconnect: DisconnectCallback = Arc::new(Mutex::new(None));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let on_frame = on_frame.clone();
            let on_disconnect = on_disconnect.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                on_frame,
                on_disconnect,
                write_tx,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        Ok(Self {
            write_tx,
            on_frame,
            on_disconnect,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        })
    }

    /// Queues an outbound frame. Frames reach the wire in send order;
    /// the write pump does the encoding.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        self.write_tx
            .send(Outbound::Frame(frame.clone()))
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Sets the callback for inbound server frames.
    pub async fn set_frame_callback(&self, cb: FrameCallback) {
        *self.on_frame.lock().await = Some(cb);
    }

    /// Sets the callback for disconnection.
    pub async fn set_disconnect_callback(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.on_disconnect.lock().await = Some(cb);
    }

    /// Gracefully closes the connection. The write pump emits the
    /// close frame as it winds down.
    pub async fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}
