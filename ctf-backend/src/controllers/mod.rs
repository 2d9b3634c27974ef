pub mod admin;
pub mod auth;
pub mod challenges;
pub mod health;
pub mod stats;

use actix_web::{web, HttpRequest};

use crate::error::ApiError;
use crate::models::{Session, User};
use crate::security::csrf;
use crate::AppState;

/// Extract the bearer token from the Authorization header
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the request's session. Anonymous sessions pass - this only
/// requires that the bearer token maps to a live session.
pub fn current_session(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<Session, ApiError> {
    let token = bearer_token(req)
        .ok_or_else(|| ApiError::Auth("No authorization token provided".to_string()))?;
    state
        .db
        .validate_session(&token)?
        .ok_or_else(|| ApiError::Auth("Invalid or expired session".to_string()))
}

/// Like `current_session`, but tolerates a missing or stale token.
/// Used by read endpoints that also serve guests.
pub fn optional_session(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<Option<Session>, ApiError> {
    match bearer_token(req) {
        Some(token) => Ok(state.db.validate_session(&token)?),
        None => Ok(None),
    }
}

/// Require an authenticated session and return the logged-in user
pub fn require_user(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<(Session, User), ApiError> {
    let session = current_session(state, req)?;
    let user_id = session
        .user_id
        .ok_or_else(|| ApiError::Auth("Login required".to_string()))?;
    let user = state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| ApiError::Auth("Login required".to_string()))?;
    Ok((session, user))
}

/// Require an authenticated admin
pub fn require_admin(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<(Session, User), ApiError> {
    let (session, user) = require_user(state, req)?;
    if !user.is_admin {
        return Err(ApiError::Auth("Admin privileges required".to_string()));
    }
    Ok((session, user))
}

/// Check the CSRF token submitted with a mutating request against the
/// session's token
pub fn check_csrf(session: &Session, submitted: &str) -> Result<(), ApiError> {
    if csrf::validate_token(&session.csrf_token, submitted) {
        Ok(())
    } else {
        Err(ApiError::Auth("Invalid CSRF token".to_string()))
    }
}
