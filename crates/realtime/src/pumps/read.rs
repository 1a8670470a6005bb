//! WebSocket read pump — parses and dispatches inbound frames.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use applyflow_protocol::constants::MAX_FRAME_SIZE;
use applyflow_protocol::frames::ServerFrame;

use crate::pumps::write::Outbound;
use crate::socket::{DisconnectCallback, SharedFrameCallback};

/// Reads frames from the WebSocket and hands them to the frame
/// callback, strictly in arrival order. Exits on close, read error, or
/// cancellation, then fires the disconnect callback.
pub(crate) async fn read_pump<S>(
    mut read: S,
    on_frame: SharedFrameCallback,
    on_disconnect: DisconnectCallback,
    write_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_frame(&text, &on_frame).await;
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(Outbound::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("received pong");
                    }
                    Some(Ok(tungstenite::Message::Close(_))) => {
                        debug!("received close frame");
                        break;
                    }
                    Some(Ok(_)) => {} // Binary — ignore
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    if let Some(cb) = on_disconnect.lock().await.as_ref() {
        cb();
    }
}

/// Parses one text frame. Malformed or oversized frames are logged and
/// dropped; the connection stays open.
async fn handle_text_frame(text: &str, on_frame: &SharedFrameCallback) {
    if text.len() > MAX_FRAME_SIZE {
        warn!("frame too large ({} bytes), dropping", text.len());
        return;
    }

    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("dropping malformed frame: {e}");
            return;
        }
    };

    let guard = on_frame.lock().await;
    if let Some(cb) = guard.as_ref() {
        cb(frame);
    } else {
        warn!("no frame callback set — dropping inbound frame");
    }
}
