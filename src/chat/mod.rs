pub mod expiry;
mod history;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;
mod ws;

use axum::{routing::get, Router};
use thiserror::Error;

use crate::AppState;

pub use expiry::{DeletionScheduler, ScheduledDeletion};
pub use protocol::{ClientEvent, ServerEvent};
pub use registry::{ConnectionHandle, Registry};
pub use session::{ChatService, Session, SessionState};
pub use store::{Conversation, ConversationStore, History, Message, PairKey};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{}", protocol::START_CHAT_DENIED)]
    Unauthorized,
    #[error("conversation not found")]
    ConversationNotFound,
    #[error("receiver not found")]
    ReceiverNotFound,
    #[error("{0}")]
    InvalidMessage(&'static str),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
        .route("/{receiver_id}", get(history::history).delete(history::delete_history))
}
