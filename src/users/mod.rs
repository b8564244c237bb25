mod store;

use axum::{debug_handler, extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::CurrentUser, AppResult, AppState};

pub use store::{
    confirm_email, create_user, find_credentials_by_email, find_identity, reset_password, set_company,
    set_confirmation_otp, set_reset_otp, soft_delete, Credentials, NewUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// An account as seen by the rest of the service. Credential columns are not part of it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub company_id: Option<Uuid>,
    pub confirmed: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me).delete(delete_me))
}

#[debug_handler(state = AppState)]
async fn me(CurrentUser { identity, .. }: CurrentUser) -> Json<Identity> {
    Json(identity)
}

#[debug_handler(state = AppState)]
async fn delete_me(
    State(db_pool): State<SqlitePool>,
    CurrentUser { identity, .. }: CurrentUser,
) -> AppResult<StatusCode> {
    soft_delete(&db_pool, identity.id).await?;
    tracing::info!(user_id = %identity.id, "user soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}
