//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! A connection starts unauthenticated and may ask `checkExisting` questions;
//! a successful `signIn` attaches a `SessionState`, writes presence and
//! spawns the relay tasks that push message and presence batches to the
//! client. Cleanup runs on graceful sign-out and on plain disconnection
//! alike.

use crate::web::{
    message_task::relay_messages,
    presence_task::relay_presence,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, SessionState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use dechat_core::domain::{RoomCredentials, RoomId, SessionHandle};
use dechat_core::presence::PresenceTracker;
use dechat_core::registry::SignInError;
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The shared write half of a client connection.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established");

    // The sender is wrapped in an Arc<Mutex<>> to allow for shared mutable
    // access across the relay tasks.
    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    let mut session: Option<SessionState> = None;
    let mut relay_tasks: Vec<JoinHandle<()>> = Vec::new();

    while let Some(Ok(frame)) = receiver.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => {
                info!("Client sent close message.");
                break;
            }
            _ => continue,
        };

        let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                continue;
            }
        };

        match client_msg {
            ClientMessage::CheckExisting {
                first_phrase,
                second_phrase,
                is_host,
            } => {
                let credentials = RoomCredentials {
                    first_phrase,
                    second_phrase,
                    host_password: None,
                    is_host,
                    display_name: None,
                };
                let display_name = app_state.registry.check_existing(&credentials).await;
                send_server_message(&ws_sender, &ServerMessage::KnownName { display_name }).await;
            }

            ClientMessage::SignIn { .. } if session.is_some() => {
                warn!("Received subsequent signIn on a live session, which is ignored.");
            }
            ClientMessage::SignIn {
                first_phrase,
                second_phrase,
                host_password,
                is_host,
                display_name,
            } => {
                let credentials = RoomCredentials {
                    first_phrase,
                    second_phrase,
                    host_password,
                    is_host,
                    display_name,
                };
                match join_room(&app_state, &ws_sender, &credentials, &mut relay_tasks).await {
                    Ok(new_session) => session = Some(new_session),
                    Err(message) => {
                        send_server_message(&ws_sender, &ServerMessage::Error { message }).await;
                    }
                }
            }

            ClientMessage::SendMessage { text, metadata } => {
                let Some(active) = session.as_ref() else {
                    warn!("Ignoring sendMessage before sign-in.");
                    continue;
                };
                let result = app_state
                    .messages
                    .send(
                        &active.room_id,
                        &active.session,
                        &active.display_name,
                        &text,
                        metadata.map(Into::into),
                    )
                    .await;
                match result {
                    Ok(()) => {
                        // A delivered message also ends the typing indicator.
                        active.typing_timer.cancel();
                        if let Err(e) = app_state
                            .presence
                            .clear_typing(&active.room_id, &active.session)
                            .await
                        {
                            warn!("Failed to clear typing state after send: {}", e);
                        }
                    }
                    // Logged and dropped; the client is not interrupted.
                    Err(e) => error!("Failed to send message: {}", e),
                }
            }

            ClientMessage::Typing { typing, content } => {
                let Some(active) = session.as_mut() else {
                    continue;
                };
                handle_typing(&app_state, active, typing, &content).await;
            }

            ClientMessage::UpdateDisplayName { display_name } => {
                let Some(active) = session.as_mut() else {
                    continue;
                };
                match app_state
                    .identity
                    .bind_display_name(&active.session, &display_name)
                    .await
                {
                    Ok(()) => active.display_name = display_name,
                    Err(e) => error!("Failed to update display name: {}", e),
                }
            }

            ClientMessage::MarkRead => {
                let Some(active) = session.as_ref() else {
                    continue;
                };
                if let Err(e) = app_state
                    .registry
                    .mark_messages_read(&active.room_id, &active.session)
                    .await
                {
                    warn!("Failed to mark messages read: {}", e);
                }
            }

            ClientMessage::SignOut => {
                info!("Client signed out.");
                send_server_message(&ws_sender, &ServerMessage::SignedOut).await;
                break;
            }
        }
    }

    // --- Cleanup ---
    for task in relay_tasks {
        task.abort();
    }
    if let Some(active) = session.take() {
        active.typing_timer.cancel();
        if let Err(e) = app_state
            .presence
            .remove(&active.room_id, &active.session)
            .await
        {
            warn!("Failed to remove presence on cleanup: {}", e);
        }
        if let Err(e) = app_state.identity.sign_out(&active.session).await {
            warn!("Failed to sign session out: {}", e);
        }
        // The disconnect guard drops with the session; its removal is
        // idempotent with the one above.
    }
    info!("WebSocket connection closed.");
}

/// Establishes the session: registry sign-in, presence write with disconnect
/// cleanup, and the two relay tasks. On failure the caller gets a
/// client-safe message; details only go to the log.
async fn join_room(
    app_state: &Arc<AppState>,
    ws_sender: &WsSender,
    credentials: &RoomCredentials,
    relay_tasks: &mut Vec<JoinHandle<()>>,
) -> Result<SessionState, String> {
    let info = app_state
        .registry
        .sign_in(credentials)
        .await
        .map_err(|e| sign_in_error_message(&e))?;

    let disconnect_guard = app_state
        .presence
        .set_presence(&info.room_id, &info.session, &info.display_name, info.is_host)
        .await
        .map_err(|e| {
            error!("Failed to write presence during sign-in: {}", e);
            "Sign-in failed. Please try again.".to_string()
        })?;

    // Subscriptions are established once per session; the old relay tasks
    // are always aborted before any new sign-in could spawn replacements.
    let message_batches = app_state.messages.subscribe(&info.room_id).await.map_err(|e| {
        error!("Failed to subscribe to messages: {}", e);
        "Sign-in failed. Please try again.".to_string()
    })?;
    let presence_maps = app_state.presence.subscribe(&info.room_id).await.map_err(|e| {
        error!("Failed to subscribe to presence: {}", e);
        "Sign-in failed. Please try again.".to_string()
    })?;

    relay_tasks.push(tokio::spawn(relay_messages(
        message_batches,
        ws_sender.clone(),
    )));
    relay_tasks.push(tokio::spawn(relay_presence(
        presence_maps,
        ws_sender.clone(),
    )));

    send_server_message(
        ws_sender,
        &ServerMessage::SignedIn {
            room_id: info.room_id.to_string(),
        },
    )
    .await;

    Ok(SessionState::new(info, disconnect_guard))
}

/// Maps a sign-in failure to what the client is allowed to see.
fn sign_in_error_message(error: &SignInError) -> String {
    match error {
        SignInError::RoomMissing => {
            info!("Sign-in rejected: room does not exist.");
            "Room not found. Check your phrases.".to_string()
        }
        SignInError::InvalidHostPassword => {
            info!("Sign-in rejected: host password mismatch.");
            "Invalid host password.".to_string()
        }
        SignInError::DisplayNameRequired => {
            warn!("Sign-in rejected: no display name available.");
            "A display name is required.".to_string()
        }
        SignInError::Store(e) => {
            error!("Sign-in failed against the store: {}", e);
            "Sign-in failed. Please try again.".to_string()
        }
    }
}

/// Forwards a typing update and re-arms the inactivity auto-clear.
async fn handle_typing(
    app_state: &Arc<AppState>,
    active: &mut SessionState,
    typing: bool,
    content: &str,
) {
    if let Err(e) = app_state
        .presence
        .update_typing(
            &active.room_id,
            &active.session,
            active.is_host,
            typing,
            content,
        )
        .await
    {
        warn!("Failed to update typing state: {}", e);
        return;
    }

    // Each keystroke replaces the pending auto-clear with a fresh one.
    active.typing_timer.cancel();
    if typing {
        let token = CancellationToken::new();
        active.typing_timer = token.clone();
        let _ = arm_typing_auto_clear(
            app_state.presence.clone(),
            active.room_id.clone(),
            active.session.clone(),
            token,
            app_state.config.typing_timeout,
        );
    }
}

/// Arms the inactivity auto-clear: unless cancelled first, the session's
/// typing flag and draft clear after `timeout` without further keystrokes.
fn arm_typing_auto_clear(
    presence: Arc<PresenceTracker>,
    room_id: RoomId,
    session: SessionHandle,
    token: CancellationToken,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                if let Err(e) = presence.clear_typing(&room_id, &session).await {
                    warn!("Failed to auto-clear typing state: {}", e);
                }
            }
        }
    })
}

/// Serializes and sends one server message. Returns whether the send
/// succeeded; failures are logged and otherwise ignored.
pub async fn send_server_message(ws_sender: &WsSender, message: &ServerMessage) -> bool {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return false;
        }
    };
    ws_sender
        .lock()
        .await
        .send(Message::Text(payload.into()))
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryRealtimeAdapter;
    use dechat_core::ports::RealtimeStore;

    async fn typing_session() -> (Arc<MemoryRealtimeAdapter>, Arc<PresenceTracker>, RoomId, SessionHandle)
    {
        let adapter = Arc::new(MemoryRealtimeAdapter::new());
        let tracker = Arc::new(PresenceTracker::new(adapter.clone()));
        let room = RoomId::from("room1");
        let session = SessionHandle::from("session1");
        tracker
            .set_presence(&room, &session, "Ana", false)
            .await
            .expect("presence written")
            .disarm();
        tracker
            .update_typing(&room, &session, false, true, "hel")
            .await
            .expect("typing set");
        (adapter, tracker, room, session)
    }

    #[tokio::test(start_paused = true)]
    async fn typing_auto_clears_after_the_inactivity_timeout() {
        let (adapter, tracker, room, session) = typing_session().await;

        let timer = arm_typing_auto_clear(
            tracker,
            room.clone(),
            session.clone(),
            CancellationToken::new(),
            Duration::from_secs(3),
        );
        timer.await.expect("timer task completes");

        let record = adapter
            .presence_snapshot(&room, &session)
            .await
            .unwrap()
            .expect("record exists");
        assert!(!record.typing);
        assert_eq!(record.typing_content, "");
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_keystroke_cancels_the_pending_auto_clear() {
        let (adapter, tracker, room, session) = typing_session().await;

        let token = CancellationToken::new();
        let timer = arm_typing_auto_clear(
            tracker,
            room.clone(),
            session.clone(),
            token.clone(),
            Duration::from_secs(3),
        );
        token.cancel();
        timer.await.expect("timer task completes");

        let record = adapter
            .presence_snapshot(&room, &session)
            .await
            .unwrap()
            .expect("record exists");
        assert!(record.typing);
        assert_eq!(record.typing_content, "hel");
    }
}
