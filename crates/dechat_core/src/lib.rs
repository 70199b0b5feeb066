pub mod codegen;
pub mod domain;
pub mod identity;
pub mod messages;
pub mod ports;
pub mod presence;
pub mod registry;

pub use codegen::{CodeGenerator, GenerateError, GeneratedCode, DEFAULT_MAX_ATTEMPTS};
pub use domain::{
    Message, MessageMetadata, NewMessage, Participant, ParticipantId, PresenceRecord, Room,
    RoomCredentials, RoomId, SessionHandle,
};
pub use identity::{derive_participant_id, derive_room_id};
pub use messages::{MessageChannel, DEFAULT_MESSAGE_WINDOW};
pub use ports::{
    DisconnectGuard, DocumentStore, IdentityService, MessageStream, PortError, PortResult,
    PresenceMap, PresenceStream, RealtimeStore,
};
pub use presence::PresenceTracker;
pub use registry::{RoomRegistry, SessionInfo, SignInError};
