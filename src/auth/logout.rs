use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use sqlx::SqlitePool;

use crate::{AppResult, AppState};

use super::{login::RefreshRequest, sign_out, tokens::TokenKeys, CurrentUser};

#[debug_handler(state = AppState)]
pub(crate) async fn logout(
    State(db_pool): State<SqlitePool>,
    State(keys): State<Arc<TokenKeys>>,
    CurrentUser { token, .. }: CurrentUser,
    Json(RefreshRequest { refresh_token }): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    sign_out(&db_pool, keys.as_ref(), &token, &refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}
