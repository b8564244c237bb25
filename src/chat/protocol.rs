//! JSON events exchanged over the chat socket, `{ "event": ..., "data": ... }`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::Conversation;

pub const START_CHAT_DENIED: &str = "Only Hr or Company owner start chat";
pub const CHAT_DELETED: &str = "Chat history deleted after 24 hours";

/// Inbound events. There is no sender field: the sender is the identity bound at handshake.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage {
        body: String,
        receiver_id: Uuid,
    },
    ScheduleDeletion {
        #[serde(default)]
        body: Option<String>,
        receiver_id: Uuid,
    },
    CancelDeletion {
        receiver_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageSent { body: String, chat: Conversation },
    MessageReceived { body: String, sender_id: Uuid },
    AuthError { message: String },
    ChatDeleted { message: String },
    DeletionScheduled { receiver_id: Uuid, due_at: i64 },
    DeletionCancelled { receiver_id: Uuid, cancelled: bool },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn client_events_parse() {
        let receiver_id = Uuid::now_v7();
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "send_message",
            "data": { "body": "Hello", "receiver_id": receiver_id },
        }))
        .unwrap();
        assert_eq!(event, ClientEvent::SendMessage { body: "Hello".into(), receiver_id });

        let event: ClientEvent = serde_json::from_value(json!({
            "event": "schedule_deletion",
            "data": { "receiver_id": receiver_id },
        }))
        .unwrap();
        assert_eq!(event, ClientEvent::ScheduleDeletion { body: None, receiver_id });
    }

    #[test]
    fn sender_id_is_not_accepted_in_place_of_receiver() {
        let parsed = serde_json::from_value::<ClientEvent>(json!({
            "event": "send_message",
            "data": { "body": "Hello", "sender_id": Uuid::now_v7() },
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn server_events_are_tagged() {
        let value = serde_json::to_value(ServerEvent::AuthError { message: START_CHAT_DENIED.into() }).unwrap();
        assert_eq!(value, json!({ "event": "auth_error", "data": { "message": START_CHAT_DENIED } }));
    }
}
