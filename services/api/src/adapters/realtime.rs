//! services/api/src/adapters/realtime.rs
//!
//! This module contains the in-process realtime store, the concrete
//! implementation of the `RealtimeStore` port from the `core` crate. It holds
//! the ephemeral per-room state (presence map and message log) in memory and
//! fans out change notifications over `tokio::sync::broadcast` channels.
//!
//! Subscribers never see diffs: each change re-delivers the full presence map
//! or the full recent message window, recomputed at notification time. A
//! lagged subscriber therefore just recomputes once instead of replaying
//! missed notifications.

use async_trait::async_trait;
use chrono::Utc;
use dechat_core::domain::{Message, NewMessage, PresenceRecord, RoomId, SessionHandle};
use dechat_core::ports::{
    DisconnectGuard, MessageStream, PortResult, PresenceMap, PresenceStream, RealtimeStore,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// How many pending change notifications a slow subscriber may fall behind
/// before it is lagged into a fresh recompute.
const CHANGE_BUFFER: usize = 64;

//=========================================================================================
// Per-Room State
//=========================================================================================

struct RoomState {
    presence: PresenceMap,
    presence_changes: broadcast::Sender<()>,
    messages: Vec<Message>,
    message_changes: broadcast::Sender<()>,
    /// Monotonic counter backing the generated message keys.
    next_message_key: u64,
}

impl RoomState {
    fn new() -> Self {
        let (presence_changes, _) = broadcast::channel(CHANGE_BUFFER);
        let (message_changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            presence: PresenceMap::new(),
            presence_changes,
            messages: Vec::new(),
            message_changes,
            next_message_key: 0,
        }
    }
}

type Rooms = HashMap<RoomId, RoomState>;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An in-process adapter that implements the `RealtimeStore` port.
#[derive(Clone, Default)]
pub struct MemoryRealtimeAdapter {
    rooms: Arc<Mutex<Rooms>>,
}

impl MemoryRealtimeAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Locks the room table. A poisoned lock only means another session panicked
/// mid-update; the state itself is still usable, so the poison is ignored.
fn lock(rooms: &Mutex<Rooms>) -> MutexGuard<'_, Rooms> {
    rooms.lock().unwrap_or_else(PoisonError::into_inner)
}

fn presence_of(rooms: &Arc<Mutex<Rooms>>, room: &RoomId) -> PresenceMap {
    lock(rooms)
        .get(room)
        .map(|state| state.presence.clone())
        .unwrap_or_default()
}

fn recent_messages(rooms: &Arc<Mutex<Rooms>>, room: &RoomId, window: usize) -> Vec<Message> {
    lock(rooms)
        .get(room)
        .map(|state| {
            let start = state.messages.len().saturating_sub(window);
            state.messages[start..].to_vec()
        })
        .unwrap_or_default()
}

/// Removes the session's presence record, notifying subscribers only when a
/// record was actually present. Shared by explicit removal and the
/// disconnect guard.
fn remove_presence_entry(rooms: &Mutex<Rooms>, room: &RoomId, session: &SessionHandle) {
    let mut rooms = lock(rooms);
    if let Some(state) = rooms.get_mut(room) {
        if state.presence.remove(session).is_some() {
            let _ = state.presence_changes.send(());
        }
    }
}

//=========================================================================================
// `RealtimeStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RealtimeStore for MemoryRealtimeAdapter {
    async fn set_presence(
        &self,
        room: &RoomId,
        session: &SessionHandle,
        record: PresenceRecord,
    ) -> PortResult<()> {
        let mut rooms = lock(&self.rooms);
        let state = rooms.entry(room.clone()).or_insert_with(RoomState::new);
        state.presence.insert(session.clone(), record);
        let _ = state.presence_changes.send(());
        Ok(())
    }

    async fn presence_snapshot(
        &self,
        room: &RoomId,
        session: &SessionHandle,
    ) -> PortResult<Option<PresenceRecord>> {
        Ok(lock(&self.rooms)
            .get(room)
            .and_then(|state| state.presence.get(session))
            .cloned())
    }

    async fn remove_presence(&self, room: &RoomId, session: &SessionHandle) -> PortResult<()> {
        remove_presence_entry(&self.rooms, room, session);
        Ok(())
    }

    async fn register_disconnect_cleanup(
        &self,
        room: &RoomId,
        session: &SessionHandle,
    ) -> PortResult<DisconnectGuard> {
        let rooms = Arc::clone(&self.rooms);
        let room = room.clone();
        let session = session.clone();
        Ok(DisconnectGuard::new(move || {
            remove_presence_entry(&rooms, &room, &session);
        }))
    }

    async fn subscribe_presence(&self, room: &RoomId) -> PortResult<PresenceStream> {
        let mut changes = {
            let mut rooms = lock(&self.rooms);
            let state = rooms.entry(room.clone()).or_insert_with(RoomState::new);
            state.presence_changes.subscribe()
        };
        let rooms = Arc::clone(&self.rooms);
        let room = room.clone();

        Ok(Box::pin(async_stream::stream! {
            yield presence_of(&rooms, &room);
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield presence_of(&rooms, &room);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    async fn append_message(&self, room: &RoomId, message: NewMessage) -> PortResult<()> {
        let mut rooms = lock(&self.rooms);
        let state = rooms.entry(room.clone()).or_insert_with(RoomState::new);

        // Zero-padded hex keys sort lexicographically in insertion order.
        let key = format!("{:016x}", state.next_message_key);
        state.next_message_key += 1;

        state.messages.push(Message {
            key,
            text: message.text,
            uid: message.uid,
            display_name: message.display_name,
            timestamp: Utc::now(),
            metadata: message.metadata,
        });
        let _ = state.message_changes.send(());
        Ok(())
    }

    async fn subscribe_messages(&self, room: &RoomId, window: usize) -> PortResult<MessageStream> {
        let mut changes = {
            let mut rooms = lock(&self.rooms);
            let state = rooms.entry(room.clone()).or_insert_with(RoomState::new);
            state.message_changes.subscribe()
        };
        let rooms = Arc::clone(&self.rooms);
        let room = room.clone();

        Ok(Box::pin(async_stream::stream! {
            yield recent_messages(&rooms, &room, window);
            loop {
                match changes.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield recent_messages(&rooms, &room, window);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dechat_core::messages::MessageChannel;
    use dechat_core::presence::PresenceTracker;
    use futures::StreamExt;

    fn room() -> RoomId {
        RoomId::from("room1")
    }

    fn session(n: u32) -> SessionHandle {
        SessionHandle::from(format!("session-{n}"))
    }

    fn new_message(n: usize) -> NewMessage {
        NewMessage {
            text: format!("message {n}"),
            uid: session(1),
            display_name: "Ana".to_owned(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn live_subscription_is_bounded_to_the_recent_window() {
        let adapter = MemoryRealtimeAdapter::new();
        let channel = MessageChannel::new(Arc::new(adapter.clone()), 100);

        for n in 0..150 {
            adapter.append_message(&room(), new_message(n)).await.unwrap();
        }

        let mut batches = channel.subscribe(&room()).await.unwrap();
        let batch = batches.next().await.expect("initial batch");
        assert_eq!(batch.len(), 100);
        // The 100 most recent, ascending.
        assert_eq!(batch[0].text, "message 50");
        assert_eq!(batch[99].text, "message 149");
    }

    #[tokio::test]
    async fn message_keys_preserve_insertion_order() {
        let adapter = MemoryRealtimeAdapter::new();
        for n in 0..10 {
            adapter.append_message(&room(), new_message(n)).await.unwrap();
        }

        let batch = recent_messages(&adapter.rooms, &room(), 100);
        let mut keys: Vec<String> = batch.iter().map(|m| m.key.clone()).collect();
        let sorted = {
            let mut sorted = keys.clone();
            sorted.sort();
            sorted
        };
        assert_eq!(keys, sorted);
        keys.dedup();
        assert_eq!(keys.len(), 10);
    }

    #[tokio::test]
    async fn subscribers_see_new_messages_as_full_batches() {
        let adapter = MemoryRealtimeAdapter::new();
        let channel = MessageChannel::new(Arc::new(adapter.clone()), 100);

        let mut batches = channel.subscribe(&room()).await.unwrap();
        assert!(batches.next().await.expect("initial batch").is_empty());

        adapter.append_message(&room(), new_message(0)).await.unwrap();
        let batch = batches.next().await.expect("batch after append");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].text, "message 0");
    }

    #[tokio::test]
    async fn dropping_the_disconnect_guard_heals_presence() {
        let adapter = MemoryRealtimeAdapter::new();
        let tracker = PresenceTracker::new(Arc::new(adapter.clone()));

        let guard = tracker
            .set_presence(&room(), &session(1), "Ana", true)
            .await
            .unwrap();
        assert!(adapter
            .presence_snapshot(&room(), &session(1))
            .await
            .unwrap()
            .is_some());

        // The session vanishes without a graceful sign-out.
        drop(guard);
        assert!(adapter
            .presence_snapshot(&room(), &session(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn presence_subscription_delivers_the_full_map_on_every_change() {
        let adapter = MemoryRealtimeAdapter::new();
        let tracker = PresenceTracker::new(Arc::new(adapter.clone()));

        let mut maps = tracker.subscribe(&room()).await.unwrap();
        assert!(maps.next().await.expect("initial map").is_empty());

        let ana = tracker
            .set_presence(&room(), &session(1), "Ana", true)
            .await
            .unwrap();
        let map = maps.next().await.expect("map with Ana");
        assert_eq!(map.len(), 1);

        let ben = tracker
            .set_presence(&room(), &session(2), "Ben", false)
            .await
            .unwrap();
        let map = maps.next().await.expect("map with both");
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&session(1)));
        assert!(map.contains_key(&session(2)));

        ana.disarm();
        ben.disarm();
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let adapter = MemoryRealtimeAdapter::new();
        let tracker = PresenceTracker::new(Arc::new(adapter.clone()));

        tracker
            .set_presence(&room(), &session(1), "Ana", false)
            .await
            .unwrap()
            .disarm();
        tracker.remove(&room(), &session(1)).await.unwrap();
        // A second removal (e.g. the disconnect cleanup after a graceful
        // sign-out) is a no-op.
        tracker.remove(&room(), &session(1)).await.unwrap();
        assert!(adapter
            .presence_snapshot(&room(), &session(1))
            .await
            .unwrap()
            .is_none());
    }
}
