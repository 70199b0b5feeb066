//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dechat_core::domain::{Participant, ParticipantId, Room, RoomId, SessionHandle};
use dechat_core::ports::{DocumentStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a sqlx error onto the port taxonomy. Connection-level failures
/// become `Unavailable` so read-only callers can fail safe.
fn map_db_error(error: sqlx::Error) -> PortError {
    match error {
        sqlx::Error::RowNotFound => PortError::NotFound("row not found".to_string()),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::Unavailable(error.to_string())
        }
        _ => PortError::Unexpected(error.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct RoomRecord {
    id: String,
    created_at: DateTime<Utc>,
    host_password: Option<String>,
    first_phrase: String,
    second_phrase: String,
}
impl RoomRecord {
    fn to_domain(self) -> Room {
        Room {
            id: RoomId::from(self.id),
            created_at: self.created_at,
            host_password: self.host_password,
            first_phrase: self.first_phrase,
            second_phrase: self.second_phrase,
        }
    }
}

#[derive(FromRow)]
struct ParticipantRecord {
    id: String,
    display_name: String,
    is_host: bool,
    created_at: DateTime<Utc>,
    last_login: DateTime<Utc>,
}
impl ParticipantRecord {
    fn to_domain(self) -> Participant {
        Participant {
            id: ParticipantId::from(self.id),
            display_name: self.display_name,
            is_host: self.is_host,
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn room_exists(&self, room: &RoomId) -> PortResult<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM rooms WHERE id = $1)")
                .bind(room.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_db_error)?;
        Ok(exists.0)
    }

    async fn get_room(&self, room: &RoomId) -> PortResult<Option<Room>> {
        let record: Option<RoomRecord> = sqlx::query_as(
            "SELECT id, created_at, host_password, first_phrase, second_phrase \
             FROM rooms WHERE id = $1",
        )
        .bind(room.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(RoomRecord::to_domain))
    }

    async fn create_room(&self, room: &Room) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO rooms (id, created_at, host_password, first_phrase, second_phrase) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(room.id.as_str())
        .bind(room.created_at)
        .bind(room.host_password.as_deref())
        .bind(&room.first_phrase)
        .bind(&room.second_phrase)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn get_participant(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
    ) -> PortResult<Option<Participant>> {
        let record: Option<ParticipantRecord> = sqlx::query_as(
            "SELECT id, display_name, is_host, created_at, last_login \
             FROM room_participants WHERE room_id = $1 AND id = $2",
        )
        .bind(room.as_str())
        .bind(participant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.map(ParticipantRecord::to_domain))
    }

    async fn create_participant(
        &self,
        room: &RoomId,
        participant: &Participant,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO room_participants \
             (room_id, id, display_name, is_host, created_at, last_login) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(room.as_str())
        .bind(participant.id.as_str())
        .bind(&participant.display_name)
        .bind(participant.is_host)
        .bind(participant.created_at)
        .bind(participant.last_login)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn refresh_last_login(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE room_participants SET last_login = $1 WHERE room_id = $2 AND id = $3",
        )
        .bind(at)
        .bind(room.as_str())
        .bind(participant.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Participant {} not found in room {}",
                participant, room
            )));
        }
        Ok(())
    }

    async fn mark_messages_read(
        &self,
        room: &RoomId,
        session: &SessionHandle,
        at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO room_read_marks (room_id, session_uid, last_read) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (room_id, session_uid) DO UPDATE SET last_read = EXCLUDED.last_read",
        )
        .bind(room.as_str())
        .bind(session.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}
