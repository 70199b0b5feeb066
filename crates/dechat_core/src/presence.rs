//! crates/dechat_core/src/presence.rs
//!
//! Maintains each connected session's online and typing state in the
//! realtime store. Records are self-healing: alongside the initial write the
//! tracker registers the store's disconnect-triggered removal, so a session
//! that vanishes uncleanly leaves no stale presence behind.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{PresenceRecord, RoomId, SessionHandle};
use crate::ports::{DisconnectGuard, PortResult, PresenceStream, RealtimeStore};

/// Writes and observes presence records. A session only ever writes its own
/// record; the tracker enforces that by taking the caller's own handle.
pub struct PresenceTracker {
    realtime: Arc<dyn RealtimeStore>,
}

impl PresenceTracker {
    pub fn new(realtime: Arc<dyn RealtimeStore>) -> Self {
        Self { realtime }
    }

    /// Marks the session online in the room and registers its removal with
    /// the store's disconnect hook. The caller must hold the returned guard
    /// for the session's lifetime.
    pub async fn set_presence(
        &self,
        room: &RoomId,
        session: &SessionHandle,
        display_name: &str,
        is_host: bool,
    ) -> PortResult<DisconnectGuard> {
        let record = PresenceRecord {
            display_name: display_name.to_owned(),
            online: true,
            is_host,
            typing: false,
            typing_content: String::new(),
            last_seen: Utc::now(),
        };
        self.realtime.set_presence(room, session, record).await?;
        self.realtime.register_disconnect_cleanup(room, session).await
    }

    /// Updates the session's typing flag and draft content.
    ///
    /// The current record is read as a one-shot snapshot and rewritten only
    /// when the flag or the content actually changed, so repeated identical
    /// updates cost at most one store write. A host's draft is withheld: the
    /// stored content stays empty no matter what the host typed.
    pub async fn update_typing(
        &self,
        room: &RoomId,
        session: &SessionHandle,
        is_host: bool,
        typing: bool,
        content: &str,
    ) -> PortResult<()> {
        let content = if is_host { "" } else { content };

        let Some(mut record) = self.realtime.presence_snapshot(room, session).await? else {
            // No presence record means the session already disconnected;
            // resurrecting one here would undo the disconnect cleanup.
            return Ok(());
        };
        if record.typing == typing && record.typing_content == content {
            return Ok(());
        }

        record.typing = typing;
        record.typing_content = content.to_owned();
        record.last_seen = Utc::now();
        self.realtime.set_presence(room, session, record).await
    }

    /// Clears the typing flag and draft. Invoked after a successful message
    /// send and by the inactivity timeout.
    pub async fn clear_typing(&self, room: &RoomId, session: &SessionHandle) -> PortResult<()> {
        self.update_typing(room, session, false, false, "").await
    }

    /// Graceful sign-out removal; idempotent with the disconnect cleanup.
    pub async fn remove(&self, room: &RoomId, session: &SessionHandle) -> PortResult<()> {
        self.realtime.remove_presence(room, session).await
    }

    /// Delivers the full participant→record map on every change in the room.
    pub async fn subscribe(&self, room: &RoomId) -> PortResult<PresenceStream> {
        self.realtime.subscribe_presence(room).await
    }
}
