//! Public facade consumed by UI code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info};

use applyflow_protocol::frames::ClientFrame;
use applyflow_protocol::types::{ChatMessage, NotificationRecord, SessionIdentity};

use crate::directory::SessionDirectory;
use crate::inbox::NotificationInbox;
use crate::reassembly::StreamReassembler;
use crate::reconnection::{
    ClientContext, cancel_scheduled_reconnect, open_connection,
};
use crate::socket::ClientError;
use crate::types::{ClientConfig, ClientEvent, ConnectionState};

/// Realtime session client.
///
/// One instance per surface (chat panel, notification feed). Owns the
/// connection lifecycle; callers observe state through the getters and
/// the event stream rather than awaiting calls.
pub struct RealtimeClient {
    pub(crate) ctx: ClientContext,
    events_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
}

impl RealtimeClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::build(config, None)
    }

    /// A client that refreshes session-list metadata through the given
    /// directory after every protocol-driven session change.
    pub fn with_directory(config: ClientConfig, directory: Arc<dyn SessionDirectory>) -> Self {
        Self::build(config, Some(directory))
    }

    fn build(config: ClientConfig, directory: Option<Arc<dyn SessionDirectory>>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let ctx = ClientContext {
            config: Arc::new(config),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            session: Arc::new(RwLock::new(SessionIdentity::default())),
            messages: Arc::new(RwLock::new(Vec::new())),
            reassembler: Arc::new(Mutex::new(StreamReassembler::new())),
            generating: Arc::new(AtomicBool::new(false)),
            inbox: Arc::new(RwLock::new(NotificationInbox::new())),
            socket: Arc::new(Mutex::new(None)),
            pending_switch: Arc::new(Mutex::new(None)),
            attempts: Arc::new(AtomicU32::new(0)),
            epoch: Arc::new(AtomicU64::new(0)),
            events_tx,
            connecting: Arc::new(AtomicBool::new(false)),
            reconnect_cancel: Arc::new(std::sync::Mutex::new(None)),
            manual_disconnect: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicBool::new(true)),
            directory,
        };
        Self {
            ctx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Explicitly connects. Resets the retry counter, so this also
    /// lifts the offline freeze after the ceiling was reached.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.ctx.manual_disconnect.store(false, Ordering::Relaxed);
        self.ctx.attempts.store(0, Ordering::Relaxed);
        cancel_scheduled_reconnect(&self.ctx.reconnect_cancel);
        open_connection(&self.ctx).await
    }

    /// User-intentional teardown: no reconnect is scheduled and the
    /// retry counter resets.
    pub async fn disconnect(&self) {
        self.ctx.manual_disconnect.store(true, Ordering::Relaxed);
        cancel_scheduled_reconnect(&self.ctx.reconnect_cancel);
        // Detach the socket's callbacks before closing it, so a late
        // close event cannot mutate state afterwards.
        self.ctx.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(socket) = self.ctx.socket.lock().await.take() {
            self.ctx.set_state(ConnectionState::Closing).await;
            socket.close().await;
        }
        self.ctx.attempts.store(0, Ordering::Relaxed);
        self.ctx.set_state(ConnectionState::Disconnected).await;
        debug!("disconnected");
    }

    /// Tears the client down. After this no callback or timer mutates
    /// state again.
    pub async fn shutdown(&self) {
        self.ctx.active.store(false, Ordering::Relaxed);
        self.disconnect().await;
        info!("realtime client shut down");
    }

    pub async fn state(&self) -> ConnectionState {
        *self.ctx.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.ctx.state.read().await, ConnectionState::Open)
    }

    /// True while an assistant reply is being streamed.
    pub fn is_generating(&self) -> bool {
        self.ctx.generating.load(Ordering::Relaxed)
    }

    pub async fn session(&self) -> SessionIdentity {
        self.ctx.session.read().await.clone()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.ctx.messages.read().await.clone()
    }

    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.ctx.inbox.read().await.records().to_vec()
    }

    pub async fn unread_count(&self) -> usize {
        self.ctx.inbox.read().await.unread_count()
    }

    /// Sends a user message.
    ///
    /// A no-op when the content is empty/whitespace, a stream is
    /// already in flight, or the connection is not open — sends are
    /// dropped while offline, never queued.
    pub async fn send(&self, content: &str) -> Result<(), ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(());
        }
        if self.ctx.generating.load(Ordering::Relaxed) {
            debug!("a stream is in flight, rejecting send");
            return Ok(());
        }
        if !self.is_connected().await {
            debug!("not connected, dropping send");
            return Ok(());
        }

        let frame = ClientFrame::Message {
            user_id: self.ctx.config.user_id.clone(),
            session_id: self.ctx.session.read().await.session_id.clone(),
            message: content.to_string(),
        };
        self.ctx
            .messages
            .write()
            .await
            .push(ChatMessage::user(uuid::Uuid::new_v4().to_string(), content));
        self.ctx.generating.store(true, Ordering::Relaxed);
        self.ctx.emit(ClientEvent::MessagesUpdated);
        self.send_frame(&frame).await
    }

    /// Switches the active session. While disconnected the target is
    /// recorded and carried by the next handshake instead.
    pub async fn switch_session(&self, session_id: &str) -> Result<(), ClientError> {
        if self.is_connected().await {
            return self
                .send_frame(&ClientFrame::Switch {
                    session_id: session_id.to_string(),
                })
                .await;
        }

        *self.ctx.pending_switch.lock().await = Some(session_id.to_string());
        debug!(session = %session_id, "recorded pending session switch");
        if let Err(e) = self.connect().await {
            // Retries are already scheduled; the pending switch survives
            // until a handshake succeeds.
            debug!(error = %e, "connect for pending switch failed");
        }
        Ok(())
    }

    /// Clears the current session and starts a new one.
    pub async fn new_session(&self) -> Result<(), ClientError> {
        let previous = {
            let mut session = self.ctx.session.write().await;
            std::mem::take(&mut *session)
        };
        self.ctx.messages.write().await.clear();
        self.ctx.reassembler.lock().await.reset();
        self.ctx.generating.store(false, Ordering::Relaxed);
        self.ctx.emit(ClientEvent::MessagesUpdated);

        if self.is_connected().await {
            self.send_frame(&ClientFrame::Clear {
                user_id: self.ctx.config.user_id.clone(),
                session_id: previous.session_id,
            })
            .await
        } else {
            Ok(())
        }
    }

    /// Marks a notification read. Idempotent; the acknowledge frame is
    /// only emitted for a newly read record and only while connected.
    pub async fn acknowledge(&self, notification_id: &str) -> Result<(), ClientError> {
        let newly_read = self.ctx.inbox.write().await.mark_read(notification_id);
        if newly_read && self.is_connected().await {
            self.send_frame(&ClientFrame::Acknowledge {
                notification_id: notification_id.to_string(),
            })
            .await
        } else {
            Ok(())
        }
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<(), ClientError> {
        let socket = self.ctx.socket.lock().await;
        let socket = socket.as_ref().ok_or(ClientError::Closed)?;
        socket.send(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite;

    use applyflow_protocol::frames::ServerFrame;
    use applyflow_protocol::types::Role;

    /// Unreachable endpoint for offline tests.
    fn dead_url() -> String {
        ClientConfig::chat_url("ws://127.0.0.1:9")
    }

    fn fast_config(url: impl Into<String>) -> ClientConfig {
        let mut config = ClientConfig::new(url, "u1");
        config.reconnect.base_delay = Duration::from_millis(1);
        config.reconnect.max_delay = Duration::from_millis(4);
        config
    }

    /// Accepts a single WebSocket connection and bridges it to channels:
    /// inbound client frames out, test-driven server frames in.
    async fn spawn_server() -> (
        String,
        mpsc::Receiver<ClientFrame>,
        mpsc::Sender<ServerFrame>,
    ) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (in_tx, in_rx) = mpsc::channel::<ClientFrame>(64);
        let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(64);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    out = out_rx.recv() => match out {
                        Some(frame) => {
                            let json = serde_json::to_string(&frame).unwrap();
                            if write.send(tungstenite::Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    msg = read.next() => match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            if let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) {
                                let _ = in_tx.send(frame).await;
                            }
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                }
            }
        });

        (ClientConfig::chat_url(&format!("ws://{addr}")), in_rx, out_tx)
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<ClientFrame>) -> ClientFrame {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server task ended")
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if condition().await {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        result.expect("condition not met in time");
    }

    #[tokio::test]
    async fn take_events_once() {
        let client = RealtimeClient::new(ClientConfig::new(dead_url(), "u1"));
        assert!(client.take_events().await.is_some());
        assert!(client.take_events().await.is_none());
    }

    #[tokio::test]
    async fn send_while_disconnected_is_noop() {
        let client = RealtimeClient::new(ClientConfig::new(dead_url(), "u1"));
        client.send("hello").await.unwrap();
        assert!(client.messages().await.is_empty());
        assert!(!client.is_generating());
    }

    #[tokio::test]
    async fn send_rejects_empty_and_whitespace() {
        let client = RealtimeClient::new(ClientConfig::new(dead_url(), "u1"));
        client.send("").await.unwrap();
        client.send("   \n\t").await.unwrap();
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test]
    async fn send_rejected_while_stream_in_flight() {
        let client = RealtimeClient::new(ClientConfig::new(dead_url(), "u1"));
        client.ctx.generating.store(true, Ordering::Relaxed);
        client.send("second question").await.unwrap();
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test]
    async fn connect_with_empty_user_is_noop() {
        let client = RealtimeClient::new(ClientConfig::new(dead_url(), ""));
        client.connect().await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.ctx.attempts.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn switch_while_disconnected_records_pending_target() {
        let client = RealtimeClient::new(fast_config(dead_url()));
        client.switch_session("s9").await.unwrap();

        assert_eq!(
            client.ctx.pending_switch.lock().await.as_deref(),
            Some("s9")
        );
        client.shutdown().await;
        // The target survives failed connects for the next handshake.
        assert_eq!(
            client.ctx.pending_switch.lock().await.as_deref(),
            Some("s9")
        );
    }

    #[tokio::test]
    async fn reconnect_attempts_stop_at_ceiling() {
        let client = RealtimeClient::new(fast_config(dead_url()));
        let mut events = client.take_events().await.unwrap();

        assert!(client.connect().await.is_err());

        wait_for(|| async { client.ctx.attempts.load(Ordering::Relaxed) >= 5 }).await;
        // Let the final scheduled attempt run and fail.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(client.ctx.attempts.load(Ordering::Relaxed), 5);
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ClientEvent::Reconnecting { attempt, .. } = event {
                seen.push(attempt);
            }
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        // An explicit facade action lifts the freeze.
        let _ = client.connect().await;
        assert!(client.ctx.attempts.load(Ordering::Relaxed) < 5);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn connect_skipped_while_another_connect_holds_the_guard() {
        let client = RealtimeClient::new(fast_config(dead_url()));
        client.ctx.connecting.store(true, Ordering::SeqCst);

        // A real dial to the dead endpoint would return Err and bump
        // the retry counter; the guard makes this a clean skip.
        client.connect().await.unwrap();

        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.ctx.attempts.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn abnormal_close_reconnects_and_resets_attempts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accept_tx, mut accept_rx) = mpsc::channel::<u32>(4);

        tokio::spawn(async move {
            // First connection drops shortly after it is established.
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            accept_tx.send(1).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(ws);
            // The replacement stays up.
            let (stream, _) = listener.accept().await.unwrap();
            let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            accept_tx.send(2).await.unwrap();
            std::future::pending::<()>().await;
        });

        let client =
            RealtimeClient::new(fast_config(ClientConfig::chat_url(&format!("ws://{addr}"))));
        let mut events = client.take_events().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(accept_rx.recv().await, Some(1));
        let second = tokio::time::timeout(Duration::from_secs(2), accept_rx.recv())
            .await
            .expect("client did not redial after the transport dropped");
        assert_eq!(second, Some(2));

        wait_for(|| async { client.is_connected().await }).await;
        // A successful open resets the abnormal-close counter.
        assert_eq!(client.ctx.attempts.load(Ordering::Relaxed), 0);

        let mut reconnect_attempts = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ClientEvent::Reconnecting { attempt, .. } = event {
                reconnect_attempts.push(attempt);
            }
        }
        assert_eq!(reconnect_attempts, vec![1]);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn handshake_is_first_frame_and_carries_pending_switch() {
        let (url, mut server_rx, _server_tx) = spawn_server().await;
        let client = RealtimeClient::new(fast_config(url));

        client.switch_session("s9").await.unwrap();

        match recv_frame(&mut server_rx).await {
            ClientFrame::Init {
                user_id,
                session_id,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(session_id.as_deref(), Some("s9"));
            }
            other => panic!("expected init frame first, got {other:?}"),
        }
        // Consumed exactly once.
        assert!(client.ctx.pending_switch.lock().await.is_none());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn chat_round_trip_reassembles_streamed_reply() {
        let (url, mut server_rx, server_tx) = spawn_server().await;
        let client = RealtimeClient::new(fast_config(url));

        client.connect().await.unwrap();
        assert!(matches!(
            recv_frame(&mut server_rx).await,
            ClientFrame::Init { session_id: None, .. }
        ));

        server_tx
            .send(ServerFrame::Session {
                session_id: "s1".into(),
                title: None,
                messages: None,
            })
            .await
            .unwrap();
        wait_for(|| async { client.session().await.session_id.as_deref() == Some("s1") }).await;

        client.send("hello").await.unwrap();
        match recv_frame(&mut server_rx).await {
            ClientFrame::Message {
                user_id,
                session_id,
                message,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(session_id.as_deref(), Some("s1"));
                assert_eq!(message, "hello");
            }
            other => panic!("expected message frame, got {other:?}"),
        }
        assert!(client.is_generating());

        for fragment in ["He", "llo"] {
            server_tx
                .send(ServerFrame::Token {
                    message_id: "ai1".into(),
                    content: fragment.into(),
                })
                .await
                .unwrap();
        }
        server_tx
            .send(ServerFrame::Complete { content: None })
            .await
            .unwrap();

        wait_for(|| async {
            let msgs = client.messages().await;
            msgs.len() == 2 && !msgs[1].is_streaming
        })
        .await;

        let msgs = client.messages().await;
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content, "hello");
        assert_eq!(msgs[1].role, Role::Assistant);
        assert_eq!(msgs[1].content, "Hello");
        assert!(!client.is_generating());

        // Starting over clears local state and tells the server.
        client.new_session().await.unwrap();
        assert!(client.messages().await.is_empty());
        assert!(client.session().await.is_empty());
        match recv_frame(&mut server_rx).await {
            ClientFrame::Clear { session_id, .. } => {
                assert_eq!(session_id.as_deref(), Some("s1"));
            }
            other => panic!("expected clear frame, got {other:?}"),
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn acknowledge_sends_frame_once_and_clamps_unread() {
        let (url, mut server_rx, server_tx) = spawn_server().await;
        let client = RealtimeClient::new(fast_config(url));

        client.connect().await.unwrap();
        recv_frame(&mut server_rx).await; // init

        server_tx
            .send(ServerFrame::Notification {
                payload: NotificationRecord {
                    id: "n1".into(),
                    kind: "application_update".into(),
                    title: "Status change".into(),
                    message: "Interview scheduled".into(),
                    priority: Default::default(),
                    read: false,
                    created_at: chrono::Utc::now(),
                },
            })
            .await
            .unwrap();
        wait_for(|| async { client.unread_count().await == 1 }).await;

        client.acknowledge("n1").await.unwrap();
        assert_eq!(client.unread_count().await, 0);
        assert!(matches!(
            recv_frame(&mut server_rx).await,
            ClientFrame::Acknowledge { notification_id } if notification_id == "n1"
        ));

        // Second acknowledge is a local no-op; count stays clamped.
        client.acknowledge("n1").await.unwrap();
        assert_eq!(client.unread_count().await, 0);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn manual_disconnect_does_not_reconnect() {
        let (url, mut server_rx, _server_tx) = spawn_server().await;
        let client = RealtimeClient::new(fast_config(url));
        let mut events = client.take_events().await.unwrap();

        client.connect().await.unwrap();
        recv_frame(&mut server_rx).await; // init
        assert!(client.is_connected().await);

        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(client.ctx.attempts.load(Ordering::Relaxed), 0);

        // No reconnect should be scheduled afterwards.
        tokio::time::sleep(Duration::from_millis(50)).await;
        while let Ok(event) = events.try_recv() {
            assert!(
                !matches!(event, ClientEvent::Reconnecting { .. }),
                "unexpected reconnect after manual disconnect"
            );
        }
    }
}
