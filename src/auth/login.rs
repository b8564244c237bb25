use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{users, AppResult, AppState};

use super::{
    authenticate,
    password::verify_secret,
    revocation,
    tokens::{issue_pair, TokenKeys, TokenKind, TokenPair},
    AuthError,
};

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub(crate) struct RefreshRequest {
    pub(crate) refresh_token: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(keys): State<Arc<TokenKeys>>,
    Json(LoginRequest { email, password }): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let email = email.trim().to_lowercase();
    let Some(creds) = users::find_credentials_by_email(&db_pool, &email).await? else {
        return Err(AuthError::InvalidCredentials)?;
    };
    if !verify_secret(password, creds.password_hash).await? {
        return Err(AuthError::InvalidCredentials)?;
    }
    if !creds.confirmed {
        return Err(AuthError::EmailNotConfirmed)?;
    }

    tracing::info!(user_id = %creds.id, "logged in");
    Ok(Json(issue_pair(keys.as_ref(), creds.id)?))
}

/// Rotates the refresh token: the presented one is revoked. Of several
/// concurrent refreshes with the same token only the one whose revocation
/// lands first gets a new pair.
#[debug_handler(state = AppState)]
pub(crate) async fn refresh(
    State(db_pool): State<SqlitePool>,
    State(keys): State<Arc<TokenKeys>>,
    Json(RefreshRequest { refresh_token }): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let auth = authenticate(&db_pool, keys.as_ref(), &refresh_token, TokenKind::Refresh).await?;
    if !revocation::revoke(&db_pool, auth.claims.jti, auth.claims.exp).await? {
        return Err(AuthError::TokenRevoked)?;
    }

    Ok(Json(issue_pair(keys.as_ref(), auth.identity.id)?))
}
