//! crates/dechat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the document
//! store, the realtime key-value store and the identity service are external
//! collaborators, and the core only ever talks to them through these ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;

use crate::domain::{
    Message, NewMessage, Participant, ParticipantId, PresenceRecord, Room, RoomId, SessionHandle,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Subscription Types
//=========================================================================================

/// The full presence state of a room: session handle → presence record.
pub type PresenceMap = HashMap<SessionHandle, PresenceRecord>;

/// A live presence subscription. Every change to any record in the room
/// delivers the full current map. Dropping the stream unsubscribes.
pub type PresenceStream = Pin<Box<dyn Stream<Item = PresenceMap> + Send>>;

/// A live message subscription. Every change delivers the recent window as a
/// full replacement batch, in the store's key order. Dropping the stream
/// unsubscribes.
pub type MessageStream = Pin<Box<dyn Stream<Item = Vec<Message>> + Send>>;

/// A compensating action registered with the realtime store, to run when the
/// owning connection is lost. Dropping the guard without calling [`disarm`]
/// runs the action, so a session that dies uncleanly still cleans up.
///
/// [`disarm`]: DisconnectGuard::disarm
pub struct DisconnectGuard {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl DisconnectGuard {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Cancels the registered action without running it.
    pub fn disarm(mut self) {
        self.action = None;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl std::fmt::Debug for DisconnectGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisconnectGuard")
            .field("armed", &self.action.is_some())
            .finish()
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The document store holding the durable room and participant records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn room_exists(&self, room: &RoomId) -> PortResult<bool>;

    async fn get_room(&self, room: &RoomId) -> PortResult<Option<Room>>;

    async fn create_room(&self, room: &Room) -> PortResult<()>;

    async fn get_participant(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> PortResult<Option<Participant>>;

    async fn create_participant(
        &self,
        room: &RoomId,
        participant: &Participant,
    ) -> PortResult<()>;

    /// Refreshes only `last_login`; every other participant field is
    /// immutable after creation.
    async fn refresh_last_login(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Records the per-session last-read timestamp on the room document.
    async fn mark_messages_read(
        &self,
        room: &RoomId,
        session: &SessionHandle,
        at: DateTime<Utc>,
    ) -> PortResult<()>;
}

/// The realtime key-value store holding the ephemeral presence state and the
/// ordered message log.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn set_presence(
        &self,
        room: &RoomId,
        session: &SessionHandle,
        record: PresenceRecord,
    ) -> PortResult<()>;

    /// A one-shot snapshot read, not a standing subscription.
    async fn presence_snapshot(
        &self,
        room: &RoomId,
        session: &SessionHandle,
    ) -> PortResult<Option<PresenceRecord>>;

    async fn remove_presence(&self, room: &RoomId, session: &SessionHandle) -> PortResult<()>;

    /// Registers removal of the session's presence record to run when the
    /// owning connection is lost.
    async fn register_disconnect_cleanup(
        &self,
        room: &RoomId,
        session: &SessionHandle,
    ) -> PortResult<DisconnectGuard>;

    async fn subscribe_presence(&self, room: &RoomId) -> PortResult<PresenceStream>;

    /// Appends a message. The store assigns the key (whose order is the
    /// insertion order) and the server timestamp.
    async fn append_message(&self, room: &RoomId, message: NewMessage) -> PortResult<()>;

    /// Subscribes to the most recent `window` messages, redelivered as a
    /// full batch on every change.
    async fn subscribe_messages(&self, room: &RoomId, window: usize) -> PortResult<MessageStream>;
}

/// The transient identity service issuing opaque anonymous session handles.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn sign_in_anonymously(&self) -> PortResult<SessionHandle>;

    async fn bind_display_name(
        &self,
        session: &SessionHandle,
        display_name: &str,
    ) -> PortResult<()>;

    async fn sign_out(&self, session: &SessionHandle) -> PortResult<()>;
}
