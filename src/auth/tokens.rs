//! Signed access/refresh tokens.
//!
//! Both kinds are HS256 JWTs, signed with distinct secrets. The `kind` claim
//! is checked after the signature so a refresh token is never accepted where
//! an access token is expected (and vice versa), even if the secrets were
//! configured identically.

use std::time::Duration;

use anyhow::Context;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::Config, db::unix_now};

use super::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id.
    pub sub: Uuid,
    /// Unique token id, the revocation key.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Supplies the signing secret and lifetime for each token kind.
pub trait SecretResolver: Send + Sync {
    fn secret(&self, kind: TokenKind) -> &[u8];
    fn ttl(&self, kind: TokenKind) -> Duration;
}

#[derive(Clone)]
pub struct TokenKeys {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.access_token_secret.as_bytes(),
            config.refresh_token_secret.as_bytes(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }
}

impl SecretResolver for TokenKeys {
    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

pub fn issue(resolver: &dyn SecretResolver, subject: Uuid, kind: TokenKind) -> anyhow::Result<IssuedToken> {
    let now = unix_now();
    let ttl = i64::try_from(resolver.ttl(kind).as_secs())?;
    let claims = Claims {
        sub: subject,
        jti: Uuid::new_v4(),
        iat: now,
        exp: now.checked_add(ttl).context("token ttl out of range")?,
        kind,
    };

    sign(resolver, &claims)
}

pub fn issue_pair(resolver: &dyn SecretResolver, subject: Uuid) -> anyhow::Result<TokenPair> {
    Ok(TokenPair {
        access_token: issue(resolver, subject, TokenKind::Access)?.token,
        refresh_token: issue(resolver, subject, TokenKind::Refresh)?.token,
    })
}

pub(crate) fn sign(resolver: &dyn SecretResolver, claims: &Claims) -> anyhow::Result<IssuedToken> {
    let key = EncodingKey::from_secret(resolver.secret(claims.kind));
    let token = encode(&Header::new(Algorithm::HS256), claims, &key)?;

    Ok(IssuedToken { token, jti: claims.jti, expires_at: claims.exp })
}

/// Signature, expiry and kind check. No storage is consulted here.
pub fn verify(resolver: &dyn SecretResolver, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let key = DecodingKey::from_secret(resolver.secret(kind));
    let claims = decode::<Claims>(token, &key, &validation)
        .map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("token expired"),
                other => tracing::debug!(error = ?other, "token rejected"),
            }
            AuthError::InvalidToken
        })?
        .claims;

    if claims.kind != kind {
        return Err(AuthError::InvalidToken);
    }

    Ok(claims)
}
