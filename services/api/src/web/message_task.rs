//! services/api/src/web/message_task.rs
//!
//! This module contains the asynchronous "worker" function that relays the
//! room's message subscription to one client.

use crate::web::{
    protocol::{MessagePayload, ServerMessage},
    ws_handler::{send_server_message, WsSender},
};
use dechat_core::ports::MessageStream;
use futures::StreamExt;
use tracing::info;

/// Forwards every message batch to the client as a full replacement window.
///
/// Runs until the subscription ends or the client stops accepting writes;
/// the session's cleanup aborts it in either case.
pub async fn relay_messages(mut batches: MessageStream, ws_sender: WsSender) {
    while let Some(batch) = batches.next().await {
        let message = ServerMessage::Messages {
            messages: batch.into_iter().map(MessagePayload::from).collect(),
        };
        if !send_server_message(&ws_sender, &message).await {
            info!("Client stopped accepting message batches. Ending relay task.");
            break;
        }
    }
}
