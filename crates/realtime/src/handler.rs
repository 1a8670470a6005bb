//! Inbound frame interpretation against shared client state.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use applyflow_protocol::frames::ServerFrame;
use applyflow_protocol::types::{ChatMessage, SessionIdentity};

use crate::reconnection::ClientContext;
use crate::types::ClientEvent;

/// Applies one server frame. Called from the per-connection dispatch
/// task, strictly in arrival order.
pub(crate) async fn handle_frame(ctx: &ClientContext, frame: ServerFrame) {
    match frame {
        ServerFrame::Session {
            session_id,
            title,
            messages,
        } => {
            debug!(session = %session_id, "session assigned");
            {
                let mut session = ctx.session.write().await;
                *session = SessionIdentity {
                    session_id: Some(session_id.clone()),
                    title: title.clone(),
                };
            }
            // Server history is authoritative: replace the sequence
            // verbatim, or clear it when none accompanies the session.
            {
                let mut msgs = ctx.messages.write().await;
                *msgs = messages.unwrap_or_default();
            }
            ctx.reassembler.lock().await.reset();
            ctx.generating.store(false, Ordering::Relaxed);
            ctx.emit(ClientEvent::MessagesUpdated);
            ctx.emit(ClientEvent::SessionChanged { session_id, title });
            spawn_session_list_refresh(ctx);
        }

        ServerFrame::Token {
            message_id,
            content,
        } => {
            let accumulated = {
                let mut reassembler = ctx.reassembler.lock().await;
                reassembler.append(&message_id, &content).to_string()
            };
            {
                let mut msgs = ctx.messages.write().await;
                match msgs.iter_mut().find(|m| m.id == message_id) {
                    Some(message) => message.content = accumulated,
                    None => {
                        // First fragment: the placeholder appears at the
                        // tail, already carrying the fragment.
                        let mut placeholder = ChatMessage::streaming_placeholder(&message_id);
                        placeholder.content = accumulated;
                        msgs.push(placeholder);
                    }
                }
            }
            ctx.emit(ClientEvent::MessagesUpdated);
        }

        ServerFrame::Complete { content } => {
            let finalized = ctx.reassembler.lock().await.finalize(content);
            if let Some((message_id, text)) = finalized {
                let mut msgs = ctx.messages.write().await;
                if let Some(message) = msgs.iter_mut().find(|m| m.id == message_id) {
                    message.content = text;
                    message.is_streaming = false;
                }
            }
            ctx.generating.store(false, Ordering::Relaxed);
            ctx.emit(ClientEvent::StreamFinished);
            ctx.emit(ClientEvent::MessagesUpdated);
        }

        ServerFrame::Error { content } => {
            warn!("server error: {content}");
            ctx.generating.store(false, Ordering::Relaxed);
            ctx.reassembler.lock().await.reset();
            {
                // A partial answer must not remain visible as final:
                // drop the trailing streaming placeholder, nothing else.
                let mut msgs = ctx.messages.write().await;
                if msgs.last().is_some_and(|m| m.is_streaming) {
                    msgs.pop();
                }
            }
            ctx.emit(ClientEvent::MessagesUpdated);
            ctx.emit(ClientEvent::ServerError(content));
        }

        ServerFrame::Notification { payload } => {
            debug!(id = %payload.id, kind = %payload.kind, "notification pushed");
            ctx.inbox.write().await.push_front(payload.clone());
            ctx.emit(ClientEvent::NotificationReceived(payload));
        }

        ServerFrame::UnreadNotifications { data } => {
            let unread = {
                let mut inbox = ctx.inbox.write().await;
                inbox.merge(data.notifications);
                inbox.unread_count()
            };
            ctx.emit(ClientEvent::UnreadSynced { unread });
        }
    }
}

/// Refreshes session-list metadata through the directory collaborator,
/// off the dispatch task so frame handling never blocks on it.
fn spawn_session_list_refresh(ctx: &ClientContext) {
    let Some(directory) = ctx.directory.clone() else {
        return;
    };
    let user_id = ctx.config.user_id.clone();
    let events_tx = ctx.events_tx.clone();
    let active = ctx.active.clone();
    tokio::spawn(async move {
        match directory.list_sessions(&user_id).await {
            Ok(sessions) => {
                if active.load(Ordering::Relaxed) {
                    let _ = events_tx.try_send(ClientEvent::SessionList(sessions));
                }
            }
            Err(e) => warn!("session list refresh failed: {e}"),
        }
    });
}
