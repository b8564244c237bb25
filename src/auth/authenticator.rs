use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use sqlx::SqlitePool;

use crate::{users::{self, Identity}, AppError};

use super::{
    revocation,
    tokens::{self, Claims, SecretResolver, TokenKeys, TokenKind},
    AuthError,
};

#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: Identity,
    pub claims: Claims,
}

/// The single authentication path, shared by HTTP requests and the chat handshake.
///
/// Checks run in a fixed order: signature and expiry, then revocation, then
/// identity lookup. Read-only.
pub async fn authenticate(
    db_pool: &SqlitePool,
    resolver: &dyn SecretResolver,
    token: &str,
    kind: TokenKind,
) -> Result<Authenticated, AuthError> {
    let claims = tokens::verify(resolver, token, kind)?;

    if revocation::is_revoked(db_pool, claims.jti).await? {
        return Err(AuthError::TokenRevoked);
    }

    let identity = users::find_identity(db_pool, claims.sub)
        .await?
        .ok_or(AuthError::IdentityNotFound)?;

    Ok(Authenticated { identity, claims })
}

/// Revokes both halves of a session. Live chat connections stay bound.
pub async fn sign_out(
    db_pool: &SqlitePool,
    resolver: &dyn SecretResolver,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), AuthError> {
    let access = tokens::verify(resolver, access_token, TokenKind::Access)?;
    let refresh = tokens::verify(resolver, refresh_token, TokenKind::Refresh)?;
    if access.sub != refresh.sub {
        return Err(AuthError::InvalidToken);
    }

    revocation::revoke(db_pool, access.jti, access.exp).await?;
    revocation::revoke(db_pool, refresh.jti, refresh.exp).await?;

    tracing::info!(user_id = %access.sub, "signed out");
    Ok(())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for routes that need a signed-in caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub claims: Claims,
    pub token: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
    Arc<TokenKeys>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or(AuthError::InvalidToken)?
            .to_owned();

        let db_pool = SqlitePool::from_ref(state);
        let keys = Arc::<TokenKeys>::from_ref(state);
        let Authenticated { identity, claims } =
            authenticate(&db_pool, keys.as_ref(), &token, TokenKind::Access).await?;

        Ok(CurrentUser { identity, claims, token })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::HeaderValue;
    use uuid::Uuid;

    use super::*;
    use crate::{
        db::memory_pool,
        users::{create_user, soft_delete, NewUser, Role},
    };

    fn keys() -> TokenKeys {
        TokenKeys::new("access", "refresh", Duration::from_secs(60), Duration::from_secs(600))
    }

    async fn seeded() -> (SqlitePool, Uuid) {
        let db_pool = memory_pool().await.unwrap();
        let id = create_user(
            &db_pool,
            NewUser { name: "Grace", email: "grace@example.com", password_hash: "x", role: Role::User },
        )
        .await
        .unwrap();
        (db_pool, id)
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let (db_pool, id) = seeded().await;
        let keys = keys();
        let token = tokens::issue(&keys, id, TokenKind::Access).unwrap();

        let auth = authenticate(&db_pool, &keys, &token.token, TokenKind::Access).await.unwrap();
        assert_eq!(auth.identity.id, id);
        assert_eq!(auth.claims.jti, token.jti);
    }

    #[tokio::test]
    async fn signed_out_tokens_are_revoked() {
        let (db_pool, id) = seeded().await;
        let keys = keys();
        let pair = tokens::issue_pair(&keys, id).unwrap();

        sign_out(&db_pool, &keys, &pair.access_token, &pair.refresh_token).await.unwrap();

        let access = authenticate(&db_pool, &keys, &pair.access_token, TokenKind::Access).await;
        assert!(matches!(access, Err(AuthError::TokenRevoked)));
        let refresh = authenticate(&db_pool, &keys, &pair.refresh_token, TokenKind::Refresh).await;
        assert!(matches!(refresh, Err(AuthError::TokenRevoked)));
    }

    #[tokio::test]
    async fn sign_out_rejects_mismatched_subjects() {
        let (db_pool, id) = seeded().await;
        let keys = keys();
        let access = tokens::issue(&keys, id, TokenKind::Access).unwrap();
        let foreign = tokens::issue(&keys, Uuid::now_v7(), TokenKind::Refresh).unwrap();

        let result = sign_out(&db_pool, &keys, &access.token, &foreign.token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
        assert!(authenticate(&db_pool, &keys, &access.token, TokenKind::Access).await.is_ok());
    }

    #[tokio::test]
    async fn deleted_identity_is_not_found() {
        let (db_pool, id) = seeded().await;
        let keys = keys();
        let token = tokens::issue(&keys, id, TokenKind::Access).unwrap();
        soft_delete(&db_pool, id).await.unwrap();

        let result = authenticate(&db_pool, &keys, &token.token, TokenKind::Access).await;
        assert!(matches!(result, Err(AuthError::IdentityNotFound)));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }
}
