use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::{auth::AuthError, chat::ChatError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

/// Request-level failures that are not tied to a particular domain module.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<AuthError>() {
            return match err {
                AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::InvalidOtp => StatusCode::BAD_REQUEST,
                _ => StatusCode::UNAUTHORIZED,
            };
        }

        if let Some(err) = self.0.downcast_ref::<ChatError>() {
            return match err {
                ChatError::Unauthorized => StatusCode::FORBIDDEN,
                ChatError::ConversationNotFound | ChatError::ReceiverNotFound => StatusCode::NOT_FOUND,
                ChatError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
                ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }

        match self.0.downcast_ref::<RequestError>() {
            Some(RequestError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            Some(RequestError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(RequestError::Conflict(_)) => StatusCode::CONFLICT,
            Some(RequestError::Forbidden(_)) => StatusCode::FORBIDDEN,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = ?self.0, "request failed");
            "internal server error".to_owned()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
