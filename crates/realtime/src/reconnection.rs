//! Connection lifecycle: connect guards, callback wiring, and the
//! bounded-backoff reconnect schedule.
//!
//! Contains the shared [`ClientContext`], socket callback setup, and
//! the reconnect machinery driven by abnormal closes.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use applyflow_protocol::frames::{ClientFrame, ServerFrame};
use applyflow_protocol::types::{ChatMessage, SessionIdentity};

use crate::directory::SessionDirectory;
use crate::inbox::NotificationInbox;
use crate::reassembly::StreamReassembler;
use crate::socket::{ClientError, Socket};
use crate::types::{ClientConfig, ClientEvent, ConnectionState};

/// Shared state threaded through the facade, socket callbacks, and the
/// reconnect loop. Avoids passing a dozen separate Arc parameters.
#[derive(Clone)]
pub(crate) struct ClientContext {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) session: Arc<RwLock<SessionIdentity>>,
    pub(crate) messages: Arc<RwLock<Vec<ChatMessage>>>,
    pub(crate) reassembler: Arc<Mutex<StreamReassembler>>,
    /// True while an assistant stream is in flight for a local send.
    pub(crate) generating: Arc<AtomicBool>,
    pub(crate) inbox: Arc<RwLock<NotificationInbox>>,
    pub(crate) socket: Arc<Mutex<Option<Socket>>>,
    /// Session id captured by a switch requested while disconnected;
    /// consumed exactly once by the next successful handshake.
    pub(crate) pending_switch: Arc<Mutex<Option<String>>>,
    /// Abnormal-close counter. Reset to zero on every successful open.
    pub(crate) attempts: Arc<AtomicU32>,
    /// Connection generation. Callbacks capture the epoch of the socket
    /// they belong to and bail out when a newer connection exists.
    pub(crate) epoch: Arc<AtomicU64>,
    pub(crate) events_tx: mpsc::Sender<ClientEvent>,
    /// Held by exactly one in-flight `open_connection` at a time.
    pub(crate) connecting: Arc<AtomicBool>,
    /// Cancel token for the currently scheduled reconnect, if any.
    pub(crate) reconnect_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    /// Set when the user explicitly disconnects.
    pub(crate) manual_disconnect: Arc<AtomicBool>,
    /// Cleared on shutdown; every callback and timer checks it first.
    pub(crate) active: Arc<AtomicBool>,
    pub(crate) directory: Option<Arc<dyn SessionDirectory>>,
}

impl ClientContext {
    /// Emits an event to the owning UI layer. Non-blocking; a full
    /// queue drops the event with a warning.
    pub(crate) fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            warn!("dropping client event: {e}");
        }
    }

    pub(crate) async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
        self.emit(ClientEvent::StateChanged(new_state));
    }
}

/// Cancels any scheduled reconnect.
pub(crate) fn cancel_scheduled_reconnect(
    slot: &std::sync::Mutex<Option<CancellationToken>>,
) {
    if let Ok(mut guard) = slot.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

/// Opens a fresh connection and performs the init/subscribe handshake.
///
/// No-ops when the client is inactive, has no user identity, is already
/// Connecting/Open, or has exhausted the attempt ceiling. On failure the
/// next attempt is scheduled via backoff before the error is returned.
pub(crate) async fn open_connection(ctx: &ClientContext) -> Result<(), ClientError> {
    if !ctx.active.load(Ordering::Relaxed) {
        debug!("client inactive, skipping connect");
        return Ok(());
    }
    if ctx.config.user_id.is_empty() {
        debug!("no user identity, skipping connect");
        return Ok(());
    }
    if ctx.attempts.load(Ordering::Relaxed) >= ctx.config.reconnect.max_attempts {
        debug!("retry ceiling reached, waiting for explicit reconnect");
        return Ok(());
    }
    // Single-winner guard: two racing connects would otherwise both
    // observe Disconnected and dial twice. Released on every exit path.
    if ctx
        .connecting
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!("connect already in progress, skipping");
        return Ok(());
    }
    if matches!(*ctx.state.read().await, ConnectionState::Open) {
        ctx.connecting.store(false, Ordering::SeqCst);
        debug!("already connected, skipping");
        return Ok(());
    }

    // Invalidate any stale socket's callbacks before opening a new
    // connection, then close it.
    let my_epoch = ctx.epoch.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(stale) = ctx.socket.lock().await.take() {
        stale.close().await;
    }

    ctx.set_state(ConnectionState::Connecting).await;
    info!(url = %ctx.config.url, "connecting");

    let socket = match Socket::connect(&ctx.config.url).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "connection failed");
            ctx.connecting.store(false, Ordering::SeqCst);
            ctx.set_state(ConnectionState::Disconnected).await;
            maybe_schedule_reconnect(ctx);
            return Err(e);
        }
    };

    setup_socket_callbacks(&socket, my_epoch, ctx.clone()).await;

    // Handshake, first frame on the wire: resume the pending switch
    // target if one was captured while disconnected, else the current
    // session.
    let pending = ctx.pending_switch.lock().await.take();
    let resume = match &pending {
        Some(id) => Some(id.clone()),
        None => ctx.session.read().await.session_id.clone(),
    };
    let init = ClientFrame::Init {
        user_id: ctx.config.user_id.clone(),
        session_id: resume,
    };
    if let Err(e) = socket.send(&init).await {
        warn!(error = %e, "handshake send failed");
        if let Some(id) = pending {
            // Not consumed: the handshake never reached the server.
            *ctx.pending_switch.lock().await = Some(id);
        }
        socket.close().await;
        ctx.connecting.store(false, Ordering::SeqCst);
        ctx.set_state(ConnectionState::Disconnected).await;
        maybe_schedule_reconnect(ctx);
        return Err(e);
    }

    *ctx.socket.lock().await = Some(socket);
    ctx.attempts.store(0, Ordering::Relaxed);
    ctx.connecting.store(false, Ordering::SeqCst);
    ctx.set_state(ConnectionState::Open).await;
    info!("connected");
    Ok(())
}

/// Wires frame dispatch and the disconnect callback onto a fresh socket.
///
/// Frames funnel through an ordered channel into a single dispatch task
/// so they are interpreted strictly in arrival order, before any
/// reconnect scheduled by the same close event runs.
pub(crate) async fn setup_socket_callbacks(socket: &Socket, my_epoch: u64, ctx: ClientContext) {
    let (frame_tx, frame_rx) = mpsc::channel::<ServerFrame>(256);
    socket
        .set_frame_callback(Box::new(move |frame| {
            if frame_tx.try_send(frame).is_err() {
                warn!("inbound frame queue full, dropping frame");
            }
        }))
        .await;

    tokio::spawn(dispatch_frames(ctx.clone(), my_epoch, frame_rx));

    let dc_ctx = ctx;
    socket
        .set_disconnect_callback(Box::new(move || {
            tokio::spawn(handle_disconnect(dc_ctx.clone(), my_epoch));
        }))
        .await;
}

/// Sequentially applies frames from one connection's dispatch channel.
///
/// When a newer connection supersedes this one mid-drain, frames that
/// already arrived are still applied before the task exits; received
/// input is never silently discarded. Frames cannot cross connections
/// here: the channel's only sender is this connection's read pump.
async fn dispatch_frames(
    ctx: ClientContext,
    my_epoch: u64,
    mut frame_rx: mpsc::Receiver<ServerFrame>,
) {
    while let Some(frame) = frame_rx.recv().await {
        if !ctx.active.load(Ordering::Relaxed) {
            break;
        }
        crate::handler::handle_frame(&ctx, frame).await;
        if ctx.epoch.load(Ordering::SeqCst) != my_epoch {
            while let Ok(frame) = frame_rx.try_recv() {
                crate::handler::handle_frame(&ctx, frame).await;
            }
            debug!("dispatcher for superseded connection exiting");
            break;
        }
    }
}

/// Authoritative close handling. Transport errors only surface here,
/// via the read pump ending.
async fn handle_disconnect(ctx: ClientContext, my_epoch: u64) {
    if ctx.epoch.load(Ordering::SeqCst) != my_epoch {
        debug!("stale disconnect callback, ignoring");
        return;
    }
    if !ctx.active.load(Ordering::Relaxed) {
        return;
    }

    ctx.socket.lock().await.take();
    ctx.set_state(ConnectionState::Disconnected).await;

    if ctx.manual_disconnect.load(Ordering::Relaxed) {
        debug!("manual disconnect, not reconnecting");
        return;
    }
    maybe_schedule_reconnect(&ctx);
}

/// Schedules the next reconnect attempt, if the ceiling allows one.
///
/// Increments the attempt counter and sleeps `min(base * 2^n, cap)`
/// before reconnecting. Once `max_attempts` abnormal closes accumulate
/// without a successful open, the client stays Disconnected until a
/// facade action resets the counter.
pub(crate) fn maybe_schedule_reconnect(ctx: &ClientContext) {
    if !ctx.active.load(Ordering::Relaxed) || ctx.manual_disconnect.load(Ordering::Relaxed) {
        return;
    }
    let attempt = ctx.attempts.load(Ordering::Relaxed);
    if attempt >= ctx.config.reconnect.max_attempts {
        info!(attempt, "reconnect ceiling reached, staying offline");
        return;
    }
    ctx.attempts.store(attempt + 1, Ordering::Relaxed);

    let delay = ctx.config.reconnect.delay_for_attempt(attempt);
    ctx.emit(ClientEvent::Reconnecting {
        attempt: attempt + 1,
        next_retry: delay,
    });
    info!(
        attempt = attempt + 1,
        delay_ms = delay.as_millis() as u64,
        "scheduling reconnect"
    );

    let cancel = CancellationToken::new();
    cancel_scheduled_reconnect(&ctx.reconnect_cancel);
    if let Ok(mut guard) = ctx.reconnect_cancel.lock() {
        *guard = Some(cancel.clone());
    }
    tokio::spawn(reconnect_after(ctx.clone(), delay, cancel));
}

/// Waits out the backoff delay and reconnects.
///
/// Returns a boxed future to break the recursive type cycle with
/// `open_connection`, which schedules this function from its failure
/// path.
fn reconnect_after(
    ctx: ClientContext,
    delay: Duration,
    cancel: CancellationToken,
) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("scheduled reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        if cancel.is_cancelled() || !ctx.active.load(Ordering::Relaxed) {
            return;
        }
        let _ = open_connection(&ctx).await;
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_scheduled_reconnect_clears_token() {
        let slot = Arc::new(std::sync::Mutex::new(None));
        let token = CancellationToken::new();
        *slot.lock().unwrap() = Some(token.clone());

        cancel_scheduled_reconnect(&slot);

        assert!(slot.lock().unwrap().is_none());
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_scheduled_reconnect_without_token_is_noop() {
        let slot = Arc::new(std::sync::Mutex::new(None));
        cancel_scheduled_reconnect(&slot);
        assert!(slot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn dispatcher_applies_frames_received_before_supersession() {
        let (ctx, _events) = testing::context(None);
        let (frame_tx, frame_rx) = mpsc::channel(8);

        for fragment in ["He", "llo"] {
            frame_tx
                .send(ServerFrame::Token {
                    message_id: "ai1".into(),
                    content: fragment.into(),
                })
                .await
                .unwrap();
        }
        frame_tx
            .send(ServerFrame::Complete { content: None })
            .await
            .unwrap();
        drop(frame_tx);

        // A newer connection already exists by the time the dispatcher
        // for epoch 0 runs; the queued stream must still land.
        ctx.epoch.store(1, Ordering::SeqCst);
        dispatch_frames(ctx.clone(), 0, frame_rx).await;

        let msgs = ctx.messages.read().await;
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "Hello");
        assert!(!msgs[0].is_streaming);
    }
}
