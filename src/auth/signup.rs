use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    appresult::RequestError,
    config::Config,
    mail::{OutboundMail, Outbox},
    users::{self, NewUser, Role},
    AppResult, AppState,
};

use super::{
    password::{check_otp, generate_otp, hash_secret, otp_expiry},
    AuthError,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub(crate) struct SignupRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
pub(crate) struct SignupResponse {
    id: Uuid,
}

#[derive(Deserialize)]
pub(crate) struct ConfirmEmailRequest {
    email: String,
    otp: String,
}

pub(crate) fn validate_password(password: &str) -> Result<(), RequestError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(RequestError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    State(outbox): State<Outbox>,
    Json(SignupRequest { name, email, password }): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let name = name.trim();
    let email = email.trim().to_lowercase();
    if name.is_empty() {
        return Err(RequestError::BadRequest("name is required".into()))?;
    }
    if !email.contains('@') {
        return Err(RequestError::BadRequest("a valid email is required".into()))?;
    }
    validate_password(&password)?;

    // the role is never taken from the request
    let role = if config.is_admin_email(&email) { Role::Admin } else { Role::User };
    let password_hash = hash_secret(password, config.bcrypt_cost).await?;
    let id = match users::create_user(&db_pool, NewUser { name, email: &email, password_hash: &password_hash, role }).await {
        Ok(id) => id,
        Err(err) if err.as_database_error().is_some_and(|e| e.is_unique_violation()) => {
            return Err(RequestError::Conflict("email already registered".into()))?;
        }
        Err(err) => return Err(err)?,
    };

    let otp = generate_otp();
    let otp_hash = hash_secret(otp.clone(), config.bcrypt_cost).await?;
    users::set_confirmation_otp(&db_pool, id, &otp_hash, otp_expiry(config.otp_ttl)?).await?;
    outbox
        .enqueue(OutboundMail {
            to: email.clone(),
            subject: "Confirm your email".to_owned(),
            body: format!("Welcome {name}! Your confirmation code is {otp}."),
        })
        .await?;

    tracing::info!(user_id = %id, "signed up");
    Ok((StatusCode::CREATED, Json(SignupResponse { id })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn confirm_email(
    State(db_pool): State<SqlitePool>,
    Json(ConfirmEmailRequest { email, otp }): Json<ConfirmEmailRequest>,
) -> AppResult<StatusCode> {
    let email = email.trim().to_lowercase();
    let Some(creds) = users::find_credentials_by_email(&db_pool, &email).await? else {
        return Err(AuthError::InvalidOtp)?;
    };
    if creds.confirmed {
        return Ok(StatusCode::NO_CONTENT);
    }

    check_otp(&otp, creds.confirm_otp_hash, creds.otp_expires_at).await?;
    users::confirm_email(&db_pool, creds.id).await?;

    tracing::info!(user_id = %creds.id, "email confirmed");
    Ok(StatusCode::NO_CONTENT)
}
