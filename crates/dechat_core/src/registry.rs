//! crates/dechat_core/src/registry.rs
//!
//! Creates and validates room and participant records, and reconciles
//! returning participants with newly supplied display names. This is the
//! sign-in path: everything between "the user typed two phrases" and "the
//! session is live".

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::domain::{
    Participant, ParticipantId, Room, RoomCredentials, RoomId, SessionHandle,
};
use crate::identity::{derive_participant_id, derive_room_id};
use crate::ports::{DocumentStore, IdentityService, PortError, PortResult};

/// The established session, handed to the realtime components.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub session: SessionHandle,
    pub display_name: String,
    pub is_host: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    /// A guest signed in to a room identifier with no room record.
    #[error("Room does not exist")]
    RoomMissing,
    /// The supplied host password does not match the stored one. The stored
    /// password is never part of the error.
    #[error("Invalid host password")]
    InvalidHostPassword,
    /// Neither a stored nor a supplied display name is available. The UI
    /// flow should have prompted before calling sign-in.
    #[error("Display name is required")]
    DisplayNameRequired,
    #[error(transparent)]
    Store(#[from] PortError),
}

/// Owns the durable room and participant records.
pub struct RoomRegistry {
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityService>,
}

impl RoomRegistry {
    pub fn new(documents: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityService>) -> Self {
        Self {
            documents,
            identity,
        }
    }

    /// Looks up the display name a returning participant used before, so the
    /// caller can skip prompting for one.
    ///
    /// Read-only and fail-safe: a missing room or a store failure both
    /// resolve to `None` rather than an error.
    pub async fn check_existing(&self, credentials: &RoomCredentials) -> Option<String> {
        match self.lookup_known_name(credentials).await {
            Ok(name) => name,
            Err(error) => {
                warn!(%error, "existing-participant lookup failed, treating as unknown");
                None
            }
        }
    }

    async fn lookup_known_name(
        &self,
        credentials: &RoomCredentials,
    ) -> PortResult<Option<String>> {
        let room_id = derive_room_id(&credentials.first_phrase, &credentials.second_phrase);
        if self.documents.get_room(&room_id).await?.is_none() {
            return Ok(None);
        }

        let participant_id = derive_participant_id(
            &credentials.first_phrase,
            &credentials.second_phrase,
            credentials.is_host,
        );
        let participant = self
            .documents
            .get_participant(&room_id, &participant_id)
            .await?;
        Ok(participant.map(|p| p.display_name))
    }

    /// Establishes a session for the supplied credentials.
    ///
    /// A host signing in to a nonexistent room creates it; a guest fails with
    /// [`SignInError::RoomMissing`]. A host re-entering an existing room must
    /// present the stored host password. A returning participant's stored
    /// display name takes priority over a freshly supplied one.
    pub async fn sign_in(
        &self,
        credentials: &RoomCredentials,
    ) -> Result<SessionInfo, SignInError> {
        let room_id = derive_room_id(&credentials.first_phrase, &credentials.second_phrase);
        let participant_id = derive_participant_id(
            &credentials.first_phrase,
            &credentials.second_phrase,
            credentials.is_host,
        );

        match self.documents.get_room(&room_id).await? {
            Some(room) => {
                if credentials.is_host && room.host_password != credentials.host_password {
                    return Err(SignInError::InvalidHostPassword);
                }
            }
            None if credentials.is_host => {
                let room = Room {
                    id: room_id.clone(),
                    created_at: Utc::now(),
                    host_password: credentials.host_password.clone(),
                    first_phrase: credentials.first_phrase.clone(),
                    second_phrase: credentials.second_phrase.clone(),
                };
                self.documents.create_room(&room).await?;
                info!(room = %room_id, "room created");
            }
            None => return Err(SignInError::RoomMissing),
        }

        let existing = self
            .documents
            .get_participant(&room_id, &participant_id)
            .await?;

        // A returning participant keeps the name they used before; a freshly
        // typed name only applies on first sign-in.
        let display_name = existing
            .as_ref()
            .map(|p| p.display_name.clone())
            .or_else(|| credentials.display_name.clone())
            .ok_or(SignInError::DisplayNameRequired)?;

        let session = self.identity.sign_in_anonymously().await?;
        self.identity
            .bind_display_name(&session, &display_name)
            .await?;

        let now = Utc::now();
        if existing.is_some() {
            self.documents
                .refresh_last_login(&room_id, &participant_id, now)
                .await?;
        } else {
            let participant = Participant {
                id: participant_id.clone(),
                display_name: display_name.clone(),
                is_host: credentials.is_host,
                created_at: now,
                last_login: now,
            };
            self.documents
                .create_participant(&room_id, &participant)
                .await?;
        }

        info!(room = %room_id, participant = %participant_id, host = credentials.is_host, "signed in");
        Ok(SessionInfo {
            room_id,
            participant_id,
            session,
            display_name,
            is_host: credentials.is_host,
        })
    }

    /// Records that the session has seen the room's messages up to now.
    pub async fn mark_messages_read(
        &self,
        room: &RoomId,
        session: &SessionHandle,
    ) -> PortResult<()> {
        self.documents
            .mark_messages_read(room, session, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryDocuments {
        rooms: Mutex<HashMap<RoomId, Room>>,
        participants: Mutex<HashMap<(RoomId, ParticipantId), Participant>>,
        read_marks: Mutex<HashMap<(RoomId, SessionHandle), DateTime<Utc>>>,
        participant_creates: AtomicUsize,
        fail_reads: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for MemoryDocuments {
        async fn room_exists(&self, room: &RoomId) -> PortResult<bool> {
            Ok(self.get_room(room).await?.is_some())
        }

        async fn get_room(&self, room: &RoomId) -> PortResult<Option<Room>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(PortError::Unavailable("store offline".to_owned()));
            }
            Ok(self.rooms.lock().unwrap().get(room).cloned())
        }

        async fn create_room(&self, room: &Room) -> PortResult<()> {
            self.rooms
                .lock()
                .unwrap()
                .insert(room.id.clone(), room.clone());
            Ok(())
        }

        async fn get_participant(
            &self,
            room: &RoomId,
            participant: &ParticipantId,
        ) -> PortResult<Option<Participant>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(PortError::Unavailable("store offline".to_owned()));
            }
            Ok(self
                .participants
                .lock()
                .unwrap()
                .get(&(room.clone(), participant.clone()))
                .cloned())
        }

        async fn create_participant(
            &self,
            room: &RoomId,
            participant: &Participant,
        ) -> PortResult<()> {
            self.participant_creates.fetch_add(1, Ordering::SeqCst);
            self.participants
                .lock()
                .unwrap()
                .insert((room.clone(), participant.id.clone()), participant.clone());
            Ok(())
        }

        async fn refresh_last_login(
            &self,
            room: &RoomId,
            participant: &ParticipantId,
            at: DateTime<Utc>,
        ) -> PortResult<()> {
            let mut participants = self.participants.lock().unwrap();
            let record = participants
                .get_mut(&(room.clone(), participant.clone()))
                .ok_or_else(|| PortError::NotFound(format!("participant {participant}")))?;
            record.last_login = at;
            Ok(())
        }

        async fn mark_messages_read(
            &self,
            room: &RoomId,
            session: &SessionHandle,
            at: DateTime<Utc>,
        ) -> PortResult<()> {
            self.read_marks
                .lock()
                .unwrap()
                .insert((room.clone(), session.clone()), at);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryIdentity {
        issued: AtomicUsize,
        names: Mutex<HashMap<SessionHandle, String>>,
    }

    #[async_trait]
    impl IdentityService for MemoryIdentity {
        async fn sign_in_anonymously(&self) -> PortResult<SessionHandle> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(SessionHandle::from(format!("session-{n}")))
        }

        async fn bind_display_name(
            &self,
            session: &SessionHandle,
            display_name: &str,
        ) -> PortResult<()> {
            self.names
                .lock()
                .unwrap()
                .insert(session.clone(), display_name.to_owned());
            Ok(())
        }

        async fn sign_out(&self, session: &SessionHandle) -> PortResult<()> {
            self.names.lock().unwrap().remove(session);
            Ok(())
        }
    }

    fn registry() -> (Arc<MemoryDocuments>, RoomRegistry) {
        let documents = Arc::new(MemoryDocuments::default());
        let identity = Arc::new(MemoryIdentity::default());
        let registry = RoomRegistry::new(documents.clone(), identity);
        (documents, registry)
    }

    fn credentials(is_host: bool, display_name: Option<&str>) -> RoomCredentials {
        RoomCredentials {
            first_phrase: "alpha".to_owned(),
            second_phrase: "bravo".to_owned(),
            host_password: Some("kiwis".to_owned()),
            is_host,
            display_name: display_name.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn host_creates_a_missing_room() {
        let (documents, registry) = registry();

        let info = registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("host sign-in creates the room");

        let room = documents
            .get_room(&info.room_id)
            .await
            .unwrap()
            .expect("room record exists");
        assert_eq!(room.first_phrase, "alpha");
        assert_eq!(room.second_phrase, "bravo");
        assert_eq!(room.host_password.as_deref(), Some("kiwis"));
        assert!(info.is_host);
        assert_eq!(info.display_name, "Ana");
    }

    #[tokio::test]
    async fn guest_sign_in_to_missing_room_fails() {
        let (_, registry) = registry();

        let error = registry
            .sign_in(&credentials(false, Some("Ben")))
            .await
            .expect_err("no room record yet");
        assert!(matches!(error, SignInError::RoomMissing));
    }

    #[tokio::test]
    async fn host_reentry_validates_the_supplied_password() {
        let (_, registry) = registry();
        registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("room created");

        let mut wrong = credentials(true, Some("Ana"));
        wrong.host_password = Some("lemon".to_owned());
        let error = registry.sign_in(&wrong).await.expect_err("wrong password");
        assert!(matches!(error, SignInError::InvalidHostPassword));

        registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("correct password re-enters");
    }

    #[tokio::test]
    async fn guest_is_unknown_until_first_sign_in() {
        let (_, registry) = registry();
        registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("host creates the room");

        assert_eq!(registry.check_existing(&credentials(false, None)).await, None);

        registry
            .sign_in(&credentials(false, Some("Ben")))
            .await
            .expect("guest first sign-in");
        assert_eq!(
            registry.check_existing(&credentials(false, None)).await,
            Some("Ben".to_owned())
        );
    }

    #[tokio::test]
    async fn returning_participant_keeps_their_original_name() {
        let (documents, registry) = registry();
        registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("first sign-in");

        let info = registry
            .sign_in(&credentials(true, Some("Zoe")))
            .await
            .expect("second sign-in");

        assert_eq!(info.display_name, "Ana");
        // The second sign-in only refreshed last_login.
        assert_eq!(documents.participant_creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sign_in_without_any_display_name_fails() {
        let (_, registry) = registry();

        let error = registry
            .sign_in(&credentials(true, None))
            .await
            .expect_err("no name available");
        assert!(matches!(error, SignInError::DisplayNameRequired));
    }

    #[tokio::test]
    async fn check_existing_fails_safe_when_the_store_is_down() {
        let (documents, registry) = registry();
        registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("sign-in");

        documents.fail_reads.store(true, Ordering::SeqCst);
        assert_eq!(registry.check_existing(&credentials(true, None)).await, None);
    }

    #[tokio::test]
    async fn mark_messages_read_records_a_timestamp() {
        let (documents, registry) = registry();
        let info = registry
            .sign_in(&credentials(true, Some("Ana")))
            .await
            .expect("sign-in");

        registry
            .mark_messages_read(&info.room_id, &info.session)
            .await
            .expect("mark read");
        let marks = documents.read_marks.lock().unwrap();
        assert!(marks.contains_key(&(info.room_id.clone(), info.session.clone())));
    }
}
