use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

// ids are uuid blobs, timestamps are unix seconds.
//
// users:          unique: id, email
// company_hr:     unique: company_id, user_id
// conversations:  unique: participant_lo, participant_hi   (lo < hi)
// messages:       ordered by seq within a conversation
// chat_deletions: unique: token; unique: participant_lo, participant_hi
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id               BLOB PRIMARY KEY NOT NULL,
    name             TEXT NOT NULL,
    email            TEXT NOT NULL UNIQUE,
    password_hash    TEXT NOT NULL,
    role             TEXT NOT NULL DEFAULT 'user',
    company_id       BLOB REFERENCES companies (id),
    confirmed        INTEGER NOT NULL DEFAULT 0,
    confirm_otp_hash TEXT,
    reset_otp_hash   TEXT,
    otp_expires_at   INTEGER,
    created_at       INTEGER NOT NULL,
    deleted_at       INTEGER
);

CREATE TABLE IF NOT EXISTS companies (
    id         BLOB PRIMARY KEY NOT NULL,
    name       TEXT NOT NULL,
    created_by BLOB NOT NULL REFERENCES users (id),
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS company_hr (
    company_id BLOB NOT NULL REFERENCES companies (id) ON DELETE CASCADE,
    user_id    BLOB NOT NULL REFERENCES users (id),
    PRIMARY KEY (company_id, user_id)
);

CREATE TABLE IF NOT EXISTS revoked_tokens (
    jti        BLOB PRIMARY KEY NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS revoked_tokens_expiry ON revoked_tokens (expires_at);

CREATE TABLE IF NOT EXISTS conversations (
    id             BLOB PRIMARY KEY NOT NULL,
    participant_lo BLOB NOT NULL,
    participant_hi BLOB NOT NULL,
    created_at     INTEGER NOT NULL,
    UNIQUE (participant_lo, participant_hi)
);

CREATE TABLE IF NOT EXISTS messages (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id BLOB NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
    sender_id       BLOB NOT NULL,
    body            TEXT NOT NULL,
    sent_at         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_by_conversation ON messages (conversation_id, seq);

CREATE TABLE IF NOT EXISTS chat_deletions (
    token          BLOB PRIMARY KEY NOT NULL,
    participant_lo BLOB NOT NULL,
    participant_hi BLOB NOT NULL,
    requested_by   BLOB NOT NULL,
    due_at         INTEGER NOT NULL,
    UNIQUE (participant_lo, participant_hi)
);
CREATE INDEX IF NOT EXISTS chat_deletions_due ON chat_deletions (due_at);
"#;

pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
