//! WebSocket write pump — encodes outbound traffic onto the wire.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use applyflow_protocol::frames::ClientFrame;

/// Outbound traffic for one connection.
pub(crate) enum Outbound {
    /// A protocol frame. Encoded as JSON text at the pump boundary, so
    /// queue order is wire order.
    Frame(ClientFrame),
    /// Pong reply mirroring a server ping payload.
    Pong(tungstenite::Bytes),
}

/// Encodes queued outbound traffic and writes it in queue order. The
/// init handshake is enqueued before any pump can produce traffic, so
/// it is always the first frame on the wire. A close frame goes out
/// when the pump winds down.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = write_rx.recv() => {
                let Some(item) = item else { break };
                let message = match item {
                    Outbound::Frame(frame) => match serde_json::to_string(&frame) {
                        Ok(json) => tungstenite::Message::Text(json.into()),
                        Err(e) => {
                            warn!("dropping unencodable frame: {e}");
                            continue;
                        }
                    },
                    Outbound::Pong(payload) => tungstenite::Message::Pong(payload),
                };
                if let Err(e) = write.send(message).await {
                    error!("WebSocket write error: {e}");
                    break;
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}
