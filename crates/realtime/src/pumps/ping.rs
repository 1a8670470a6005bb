//! Keepalive pump — periodic protocol-level ping frames.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use applyflow_protocol::constants::KEEPALIVE_PERIOD;
use applyflow_protocol::frames::ClientFrame;

use crate::pumps::write::Outbound;

/// Queues a ping frame on a fixed period while the connection is up.
/// No reply is expected; the pulse only keeps intermediaries from
/// treating the connection as idle. The pump is tied to the socket's
/// cancel token, so it stops the moment the connection is not open and
/// restarts with the next one.
pub(crate) async fn ping_pump(write_tx: mpsc::Sender<Outbound>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(KEEPALIVE_PERIOD);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if write_tx.send(Outbound::Frame(ClientFrame::Ping)).await.is_err() {
                    break;
                }
            }
        }
    }
}
