use axum::{debug_handler, extract::{Path, State}, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{auth::CurrentUser, AppResult, AppState};

use super::{session::ChatService, store::History};

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    Path(receiver_id): Path<Uuid>,
    State(chat): State<ChatService>,
    CurrentUser { identity, .. }: CurrentUser,
) -> AppResult<Json<History>> {
    Ok(Json(chat.store().fetch_history(identity.id, receiver_id).await?))
}

/// Unlike starting a chat over the socket, any participant may clear the history.
#[debug_handler(state = AppState)]
pub(crate) async fn delete_history(
    Path(receiver_id): Path<Uuid>,
    State(chat): State<ChatService>,
    CurrentUser { identity, .. }: CurrentUser,
) -> AppResult<Json<Value>> {
    let deleted = chat.store().remove(identity.id, receiver_id).await?;
    if deleted {
        tracing::info!(user_id = %identity.id, receiver_id = %receiver_id, "chat history deleted");
    }
    Ok(Json(json!({ "deleted": deleted })))
}
