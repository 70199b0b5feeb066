//! crates/dechat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;

/// A room identifier derived from the ordered phrase pair.
///
/// This is a short, path-safe fingerprint, not a cryptographic hash. Two
/// different phrase pairs can in principle collide; the code generator is
/// responsible for checking uniqueness before handing out new codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

/// A participant identifier derived from the phrase pair plus the role flag.
/// A host and a guest in the same room always get different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

/// An opaque anonymous session handle issued by the identity service.
/// One handle per connected client instance; never reused across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(RoomId);
string_id!(ParticipantId);
string_id!(SessionHandle);

/// A persisted room, created once by whichever party first signs in as host.
/// Rooms are never deleted by the system.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub created_at: DateTime<Utc>,
    /// Stored verbatim and compared verbatim on host re-entry; not hashed.
    pub host_password: Option<String>,
    pub first_phrase: String,
    pub second_phrase: String,
}

/// A persisted per-room participant. Created on first sign-in for the derived
/// identifier; subsequent sign-ins only refresh `last_login`.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub is_host: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// Ephemeral per-session liveness and typing state, keyed by
/// (room, session handle). Self-healing on disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub display_name: String,
    pub online: bool,
    pub is_host: bool,
    pub typing: bool,
    /// The in-progress draft. Only ever populated for a guest; a host's
    /// draft is withheld from the record.
    pub typing_content: String,
    pub last_seen: DateTime<Utc>,
}

/// An optional payload block for non-text messages such as voice notes.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMetadata {
    pub kind: String,
    pub content: String,
    pub duration: Option<f64>,
}

/// A chat message, immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Store-generated key; its lexicographic order is the insertion order.
    pub key: String,
    pub text: String,
    pub uid: SessionHandle,
    pub display_name: String,
    /// Server-assigned at append time.
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<MessageMetadata>,
}

/// A message as submitted by a client, before the store assigns its key
/// and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub text: String,
    pub uid: SessionHandle,
    pub display_name: String,
    pub metadata: Option<MessageMetadata>,
}

/// Everything a party supplies when entering a room.
#[derive(Debug, Clone)]
pub struct RoomCredentials {
    pub first_phrase: String,
    pub second_phrase: String,
    pub host_password: Option<String>,
    pub is_host: bool,
    pub display_name: Option<String>,
}
