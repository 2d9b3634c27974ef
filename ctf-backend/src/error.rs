//! Error taxonomy for the API surface.
//!
//! Every variant maps to a structured `{success: false, message}` JSON body.
//! Database failures are logged and surfaced as a generic message unless
//! debug mode is enabled.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::config;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input: format, missing field, pattern mismatch
    #[error("{0}")]
    Validation(String),

    /// Missing/invalid session, admin flag, credentials, or CSRF token
    #[error("{0}")]
    Auth(String),

    /// Referenced challenge/user id absent
    #[error("{0}")]
    NotFound(String),

    /// Duplicate username/email
    #[error("{0}")]
    Conflict(String),

    /// Destructive admin action against oneself
    #[error("{0}")]
    SelfAction(String),

    /// Unexpected persistence failure
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// Hashing or other internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                ApiError::NotFound("Requested record was not found".to_string())
            }
            other => ApiError::Database(other),
        }
    }
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(e: argon2::password_hash::Error) -> Self {
        ApiError::Internal(format!("password hashing failed: {}", e))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::SelfAction(_) => StatusCode::FORBIDDEN,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Database(_) | ApiError::Internal(_) => {
                log::error!("{}", self);
                if config::debug_mode() {
                    self.to_string()
                } else {
                    "An error occurred. Please try again.".to_string()
                }
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            message,
        })
    }
}
