//! crates/dechat_core/src/messages.rs
//!
//! Appends messages to the room's bounded, ordered log and delivers a live,
//! time-ordered view to subscribers. Each change redelivers the whole recent
//! window as a full replacement batch; with the window capped there is no
//! merge logic or gap detection on the consuming side.

use std::sync::Arc;

use futures::StreamExt;

use crate::domain::{MessageMetadata, NewMessage, RoomId, SessionHandle};
use crate::ports::{MessageStream, PortResult, RealtimeStore};

/// The default size of the live message window.
pub const DEFAULT_MESSAGE_WINDOW: usize = 100;

pub struct MessageChannel {
    realtime: Arc<dyn RealtimeStore>,
    window: usize,
}

impl MessageChannel {
    pub fn new(realtime: Arc<dyn RealtimeStore>, window: usize) -> Self {
        Self { realtime, window }
    }

    /// Appends a message to the room's log. A message with neither text nor
    /// metadata is silently dropped. The store assigns the key and the
    /// server timestamp.
    pub async fn send(
        &self,
        room: &RoomId,
        uid: &SessionHandle,
        display_name: &str,
        text: &str,
        metadata: Option<MessageMetadata>,
    ) -> PortResult<()> {
        if text.trim().is_empty() && metadata.is_none() {
            return Ok(());
        }
        let message = NewMessage {
            text: text.to_owned(),
            uid: uid.clone(),
            display_name: display_name.to_owned(),
            metadata,
        };
        self.realtime.append_message(room, message).await
    }

    /// Subscribes to the room's recent messages.
    ///
    /// The store delivers the window in its own key order; batches are
    /// re-sorted here ascending by server timestamp, because key order and
    /// timestamp order can diverge under concurrent writes. The sort is
    /// stable, so key order still breaks timestamp ties.
    pub async fn subscribe(&self, room: &RoomId) -> PortResult<MessageStream> {
        let batches = self.realtime.subscribe_messages(room, self.window).await?;
        Ok(batches
            .map(|mut batch| {
                batch.sort_by_key(|message| message.timestamp);
                batch
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, PresenceRecord};
    use crate::ports::{DisconnectGuard, PortError, PresenceMap, PresenceStream};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use futures::stream;
    use std::sync::Mutex;

    /// A realtime-store double that records appends and replays a canned
    /// batch to subscribers.
    #[derive(Default)]
    struct CannedStore {
        appended: Mutex<Vec<NewMessage>>,
        batch: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl RealtimeStore for CannedStore {
        async fn set_presence(
            &self,
            _room: &RoomId,
            _session: &SessionHandle,
            _record: PresenceRecord,
        ) -> PortResult<()> {
            Err(PortError::Unexpected("not under test".to_owned()))
        }

        async fn presence_snapshot(
            &self,
            _room: &RoomId,
            _session: &SessionHandle,
        ) -> PortResult<Option<PresenceRecord>> {
            Ok(None)
        }

        async fn remove_presence(
            &self,
            _room: &RoomId,
            _session: &SessionHandle,
        ) -> PortResult<()> {
            Ok(())
        }

        async fn register_disconnect_cleanup(
            &self,
            _room: &RoomId,
            _session: &SessionHandle,
        ) -> PortResult<DisconnectGuard> {
            Ok(DisconnectGuard::new(|| {}))
        }

        async fn subscribe_presence(&self, _room: &RoomId) -> PortResult<PresenceStream> {
            Ok(Box::pin(stream::empty::<PresenceMap>()))
        }

        async fn append_message(&self, _room: &RoomId, message: NewMessage) -> PortResult<()> {
            self.appended.lock().unwrap().push(message);
            Ok(())
        }

        async fn subscribe_messages(
            &self,
            _room: &RoomId,
            _window: usize,
        ) -> PortResult<MessageStream> {
            let batch = self.batch.lock().unwrap().clone();
            Ok(Box::pin(stream::iter(vec![batch])))
        }
    }

    fn message(key: &str, text: &str, offset_secs: i64) -> Message {
        Message {
            key: key.to_owned(),
            text: text.to_owned(),
            uid: SessionHandle::from("session1"),
            display_name: "Ana".to_owned(),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
            metadata: None,
        }
    }

    fn channel(store: &Arc<CannedStore>) -> MessageChannel {
        MessageChannel::new(
            store.clone() as Arc<dyn RealtimeStore>,
            DEFAULT_MESSAGE_WINDOW,
        )
    }

    #[tokio::test]
    async fn blank_text_without_metadata_is_dropped() {
        let store = Arc::new(CannedStore::default());
        let channel = channel(&store);
        let room = RoomId::from("room1");
        let author = SessionHandle::from("session1");

        channel.send(&room, &author, "Ana", "", None).await.unwrap();
        channel
            .send(&room, &author, "Ana", "   \n\t", None)
            .await
            .unwrap();
        assert!(store.appended.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn metadata_alone_is_enough_to_send() {
        let store = Arc::new(CannedStore::default());
        let channel = channel(&store);
        let room = RoomId::from("room1");
        let author = SessionHandle::from("session1");

        let metadata = MessageMetadata {
            kind: "voice".to_owned(),
            content: "https://example.test/note.webm".to_owned(),
            duration: Some(2.5),
        };
        channel
            .send(&room, &author, "Ana", "", Some(metadata))
            .await
            .unwrap();

        let appended = store.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].metadata.as_ref().unwrap().kind, "voice");
    }

    #[tokio::test]
    async fn batches_are_delivered_ascending_by_timestamp() {
        let store = Arc::new(CannedStore::default());
        // Key order differs from timestamp order, as it can under
        // concurrent writes from several clients.
        *store.batch.lock().unwrap() = vec![
            message("0001", "second", 2),
            message("0002", "third", 3),
            message("0003", "first", 1),
        ];
        let channel = channel(&store);

        let mut batches = channel.subscribe(&RoomId::from("room1")).await.unwrap();
        let batch = batches.next().await.expect("one batch");
        let texts: Vec<&str> = batch.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
