//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use dechat_core::codegen::CodeGenerator;
use dechat_core::domain::{ParticipantId, RoomId, SessionHandle};
use dechat_core::messages::MessageChannel;
use dechat_core::ports::{DisconnectGuard, IdentityService};
use dechat_core::presence::PresenceTracker;
use dechat_core::registry::{RoomRegistry, SessionInfo};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
    pub codegen: Arc<CodeGenerator>,
    pub presence: Arc<PresenceTracker>,
    pub messages: Arc<MessageChannel>,
    pub identity: Arc<dyn IdentityService>,
}

//=========================================================================================
// SessionState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active WebSocket connection. Created by a
/// successful sign-in and torn down when the connection ends, this is the
/// one place the session's identity lives; every component that needs it
/// gets it passed explicitly.
pub struct SessionState {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub session: SessionHandle,
    pub display_name: String,
    pub is_host: bool,
    /// Cancels the pending typing auto-clear; replaced on every keystroke.
    pub typing_timer: CancellationToken,
    /// Removes this session's presence record if the connection dies before
    /// the graceful cleanup runs. Held, not read.
    _disconnect_guard: DisconnectGuard,
}

impl SessionState {
    pub fn new(info: SessionInfo, disconnect_guard: DisconnectGuard) -> Self {
        Self {
            room_id: info.room_id,
            participant_id: info.participant_id,
            session: info.session,
            display_name: info.display_name,
            is_host: info.is_host,
            typing_timer: CancellationToken::new(),
            _disconnect_guard: disconnect_guard,
        }
    }
}
