mod authenticator;
mod login;
mod logout;
mod password;
pub mod revocation;
mod signup;
pub mod tokens;

use axum::{routing::post, Router};
use thiserror::Error;

use crate::AppState;

pub use authenticator::{authenticate, bearer_token, sign_out, Authenticated, CurrentUser};
pub use tokens::{Claims, SecretResolver, TokenKeys, TokenKind, TokenPair};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token has been revoked")]
    TokenRevoked,
    #[error("identity not found")]
    IdentityNotFound,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email address not confirmed")]
    EmailNotConfirmed,
    #[error("invalid or expired code")]
    InvalidOtp,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::signup))
        .route("/confirm-email", post(signup::confirm_email))
        .route("/login", post(login::login))
        .route("/refresh", post(login::refresh))
        .route("/logout", post(logout::logout))
        .route("/forgot-password", post(password::forgot_password))
        .route("/reset-password", post(password::reset_password))
}
