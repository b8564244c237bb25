use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::unix_now;

use super::{Identity, Role};

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

/// Everything needed to check a password or an OTP. Never leaves the auth module.
#[derive(Debug, sqlx::FromRow)]
pub struct Credentials {
    pub id: Uuid,
    pub password_hash: String,
    pub confirmed: bool,
    pub confirm_otp_hash: Option<String>,
    pub reset_otp_hash: Option<String>,
    pub otp_expires_at: Option<i64>,
}

pub async fn create_user(db_pool: &SqlitePool, user: NewUser<'_>) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id,name,email,password_hash,role,created_at) VALUES (?,?,?,?,?,?)")
        .bind(id)
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role)
        .bind(unix_now())
        .execute(db_pool)
        .await?;

    tracing::debug!(user_id = %id, role = ?user.role, "created user");
    Ok(id)
}

/// Resolves a live (not soft-deleted) identity without credential columns.
pub async fn find_identity(db_pool: &SqlitePool, id: Uuid) -> Result<Option<Identity>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,name,email,role,company_id,confirmed FROM users WHERE id=? AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(db_pool)
    .await
}

pub async fn find_credentials_by_email(db_pool: &SqlitePool, email: &str) -> Result<Option<Credentials>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,password_hash,confirmed,confirm_otp_hash,reset_otp_hash,otp_expires_at \
         FROM users WHERE email=? AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(db_pool)
    .await
}

pub async fn set_confirmation_otp(db_pool: &SqlitePool, id: Uuid, otp_hash: &str, expires_at: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET confirm_otp_hash=?, otp_expires_at=? WHERE id=?")
        .bind(otp_hash)
        .bind(expires_at)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn confirm_email(db_pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET confirmed=1, confirm_otp_hash=NULL, otp_expires_at=NULL WHERE id=?")
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn set_reset_otp(db_pool: &SqlitePool, id: Uuid, otp_hash: &str, expires_at: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET reset_otp_hash=?, otp_expires_at=? WHERE id=?")
        .bind(otp_hash)
        .bind(expires_at)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn reset_password(db_pool: &SqlitePool, id: Uuid, password_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password_hash=?, reset_otp_hash=NULL, otp_expires_at=NULL WHERE id=?")
        .bind(password_hash)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn set_company(db_pool: &SqlitePool, id: Uuid, company_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET company_id=? WHERE id=?")
        .bind(company_id)
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Flags the user as deleted. Returns false if it was already gone.
pub async fn soft_delete(db_pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET deleted_at=? WHERE id=? AND deleted_at IS NULL")
        .bind(unix_now())
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(result.rows_affected() == 1)
}
