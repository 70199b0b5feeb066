//! services/api/src/web/presence_task.rs
//!
//! This module contains the asynchronous "worker" function that relays the
//! room's presence subscription to one client.

use crate::web::{
    protocol::{PresencePayload, ServerMessage},
    ws_handler::{send_server_message, WsSender},
};
use dechat_core::ports::PresenceStream;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::info;

/// Forwards every presence change to the client as the full current map.
pub async fn relay_presence(mut maps: PresenceStream, ws_sender: WsSender) {
    while let Some(map) = maps.next().await {
        let participants: HashMap<String, PresencePayload> = map
            .into_iter()
            .map(|(session, record)| (session.into_inner(), PresencePayload::from(record)))
            .collect();
        let message = ServerMessage::Presence { participants };
        if !send_server_message(&ws_sender, &message).await {
            info!("Client stopped accepting presence updates. Ending relay task.");
            break;
        }
    }
}
