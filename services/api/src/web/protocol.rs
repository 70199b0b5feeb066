//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server for the phrase-based chat application. Wire payloads use
//! camelCase field names.

use dechat_core::domain::{Message, MessageMetadata, PresenceRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Asks whether the derived participant already has a display name, so
    /// the UI can skip prompting for one. Allowed before sign-in.
    CheckExisting {
        first_phrase: String,
        second_phrase: String,
        is_host: bool,
    },

    /// Establishes the session. Must precede every other non-check message.
    SignIn {
        first_phrase: String,
        second_phrase: String,
        #[serde(default)]
        host_password: Option<String>,
        is_host: bool,
        #[serde(default)]
        display_name: Option<String>,
    },

    /// Appends a chat message to the room.
    SendMessage {
        text: String,
        #[serde(default)]
        metadata: Option<MetadataPayload>,
    },

    /// Updates the typing indicator. Content is the in-progress draft; it is
    /// ignored (stored empty) when the sender is the host.
    Typing {
        typing: bool,
        #[serde(default)]
        content: String,
    },

    /// Rebinds the session's display name.
    UpdateDisplayName { display_name: String },

    /// Records that this session has seen the room's messages.
    MarkRead,

    /// Gracefully ends the session.
    SignOut,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The answer to a `checkExisting` request.
    KnownName { display_name: Option<String> },

    /// Confirms a successful sign-in.
    SignedIn { room_id: String },

    /// The full recent message window, ascending by server timestamp.
    /// Replaces any previously delivered batch.
    Messages { messages: Vec<MessagePayload> },

    /// The full presence map of the room: session handle → record.
    Presence {
        participants: HashMap<String, PresencePayload>,
    },

    /// Confirms a graceful sign-out; the server closes the connection next.
    SignedOut,

    /// Reports an error to the client, which should display it.
    Error { message: String },
}

//=========================================================================================
// Wire Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl From<MetadataPayload> for MessageMetadata {
    fn from(payload: MetadataPayload) -> Self {
        Self {
            kind: payload.kind,
            content: payload.content,
            duration: payload.duration,
        }
    }
}

impl From<MessageMetadata> for MetadataPayload {
    fn from(metadata: MessageMetadata) -> Self {
        Self {
            kind: metadata.kind,
            content: metadata.content,
            duration: metadata.duration,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: String,
    pub text: String,
    pub uid: String,
    pub display_name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataPayload>,
}

impl From<Message> for MessagePayload {
    fn from(message: Message) -> Self {
        Self {
            id: message.key,
            text: message.text,
            uid: message.uid.into_inner(),
            display_name: message.display_name,
            timestamp: message.timestamp.timestamp_millis(),
            metadata: message.metadata.map(MetadataPayload::from),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub display_name: String,
    pub online: bool,
    pub is_host: bool,
    pub typing: bool,
    pub typing_content: String,
    pub last_seen: String,
}

impl From<PresenceRecord> for PresencePayload {
    fn from(record: PresenceRecord) -> Self {
        Self {
            display_name: record.display_name,
            online: record.online,
            is_host: record.is_host,
            typing: record.typing,
            typing_content: record.typing_content,
            last_seen: record.last_seen.to_rfc3339(),
        }
    }
}
