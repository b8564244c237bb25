use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::unix_now;

/// Marks a token id as revoked until its natural expiry. Revoking twice is a no-op.
///
/// Returns true only for the call that inserted the entry, so a caller can
/// use it to consume a token exactly once.
pub async fn revoke(db_pool: &SqlitePool, jti: Uuid, expires_at: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO revoked_tokens (jti,expires_at) VALUES (?,?)")
        .bind(jti)
        .bind(expires_at)
        .execute(db_pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn is_revoked(db_pool: &SqlitePool, jti: Uuid) -> Result<bool, sqlx::Error> {
    Ok(sqlx::query("SELECT 1 FROM revoked_tokens WHERE jti=?")
        .bind(jti)
        .fetch_optional(db_pool)
        .await?
        .is_some())
}

/// Drops entries whose token would be rejected as expired anyway.
pub async fn purge_expired(db_pool: &SqlitePool, now: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
        .bind(now)
        .execute(db_pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn run_sweeper(db_pool: SqlitePool, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match purge_expired(&db_pool, unix_now()).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "purged expired revoked tokens"),
            Err(err) => tracing::warn!(error = %err, "revoked token sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let db_pool = memory_pool().await.unwrap();
        let jti = Uuid::new_v4();

        assert!(!is_revoked(&db_pool, jti).await.unwrap());
        assert!(revoke(&db_pool, jti, 100).await.unwrap());
        assert!(!revoke(&db_pool, jti, 100).await.unwrap());
        assert!(is_revoked(&db_pool, jti).await.unwrap());
    }

    #[tokio::test]
    async fn purge_keeps_unexpired_entries() {
        let db_pool = memory_pool().await.unwrap();
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        revoke(&db_pool, old, 100).await.unwrap();
        revoke(&db_pool, fresh, 300).await.unwrap();

        assert_eq!(purge_expired(&db_pool, 200).await.unwrap(), 1);
        assert!(!is_revoked(&db_pool, old).await.unwrap());
        assert!(is_revoked(&db_pool, fresh).await.unwrap());
    }
}
