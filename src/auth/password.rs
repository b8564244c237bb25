use std::{sync::Arc, time::Duration};

use anyhow::Context;

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    config::Config,
    db::unix_now,
    mail::{OutboundMail, Outbox},
    users, AppResult, AppState,
};

use super::{signup::validate_password, AuthError};

pub(crate) fn generate_otp() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

/// bcrypt runs on the blocking pool.
pub(crate) async fn hash_secret(secret: String, cost: u32) -> anyhow::Result<String> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost)).await??)
}

pub(crate) async fn verify_secret(secret: String, hash: String) -> anyhow::Result<bool> {
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash)).await??)
}

/// Absolute expiry of a code issued now.
pub(crate) fn otp_expiry(ttl: Duration) -> anyhow::Result<i64> {
    let ttl = i64::try_from(ttl.as_secs())?;
    unix_now().checked_add(ttl).context("otp ttl out of range")
}

/// Accepts `otp` if it matches the stored hash and has not expired.
pub(crate) async fn check_otp(otp: &str, hash: Option<String>, expires_at: Option<i64>) -> AppResult<()> {
    let (Some(hash), Some(expires_at)) = (hash, expires_at) else {
        return Err(AuthError::InvalidOtp)?;
    };
    if expires_at < unix_now() || !verify_secret(otp.to_owned(), hash).await? {
        return Err(AuthError::InvalidOtp)?;
    }
    Ok(())
}

pub(crate) async fn send_reset_otp(db_pool: &SqlitePool, config: &Config, outbox: &Outbox, user_id: Uuid, email: &str) -> AppResult<()> {
    let otp = generate_otp();
    let otp_hash = hash_secret(otp.clone(), config.bcrypt_cost).await?;
    let expires_at = otp_expiry(config.otp_ttl)?;
    users::set_reset_otp(db_pool, user_id, &otp_hash, expires_at).await?;

    outbox
        .enqueue(OutboundMail {
            to: email.to_owned(),
            subject: "Reset your password".to_owned(),
            body: format!("Your password reset code is {otp}. It expires in {} minutes.", config.otp_ttl.as_secs() / 60),
        })
        .await?;
    Ok(())
}

#[derive(Deserialize)]
pub(crate) struct ForgotPasswordRequest {
    email: String,
}

#[derive(Deserialize)]
pub(crate) struct ResetPasswordRequest {
    email: String,
    otp: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn forgot_password(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    State(outbox): State<Outbox>,
    Json(ForgotPasswordRequest { email }): Json<ForgotPasswordRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let email = email.trim().to_lowercase();
    if let Some(creds) = users::find_credentials_by_email(&db_pool, &email).await? {
        send_reset_otp(&db_pool, &config, &outbox, creds.id, &email).await?;
    } else {
        tracing::debug!(email = %email, "password reset requested for unknown email");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "if the account exists, a reset code has been sent" })),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reset_password(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Json(ResetPasswordRequest { email, otp, password }): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    validate_password(&password)?;

    let email = email.trim().to_lowercase();
    let Some(creds) = users::find_credentials_by_email(&db_pool, &email).await? else {
        return Err(AuthError::InvalidOtp)?;
    };
    check_otp(&otp, creds.reset_otp_hash, creds.otp_expires_at).await?;

    let password_hash = hash_secret(password, config.bcrypt_cost).await?;
    users::reset_password(&db_pool, creds.id, &password_hash).await?;

    tracing::info!(user_id = %creds.id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..32 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn otp_expiry_rejects_out_of_range_ttls() {
        let expires_at = otp_expiry(Duration::from_secs(600)).unwrap();
        assert!(expires_at > unix_now());
        assert!(otp_expiry(Duration::from_secs(u64::MAX)).is_err());
        assert!(otp_expiry(Duration::from_secs(i64::MAX as u64)).is_err());
    }

    #[tokio::test]
    async fn otp_check_rejects_wrong_and_expired_codes() {
        let hash = hash_secret("123456".into(), 4).await.unwrap();
        let later = unix_now() + 60;

        assert!(check_otp("123456", Some(hash.clone()), Some(later)).await.is_ok());
        assert!(check_otp("654321", Some(hash.clone()), Some(later)).await.is_err());
        assert!(check_otp("123456", Some(hash), Some(unix_now() - 1)).await.is_err());
        assert!(check_otp("123456", None, Some(later)).await.is_err());
    }
}
