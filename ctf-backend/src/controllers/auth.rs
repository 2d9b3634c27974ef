//! Session bootstrap, registration, login, and logout.
//!
//! Guests get an anonymous session first (GET /api/session) so every mutating
//! request - including registration itself - carries a CSRF token. Login and
//! registration bind the user to that session, rotate the CSRF token, and
//! merge any client-held guest progress.

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::controllers::{check_csrf, current_session, optional_session};
use crate::error::ApiError;
use crate::models::{LocalEasterEgg, LocalProgressEntry, User};
use crate::security::sanitize::{sanitize_input, validate_email, validate_username};
use crate::security::password::hash_secret;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/session").route(web::get().to(get_session)));
    cfg.service(web::resource("/api/register").route(web::post().to(register)));
    cfg.service(web::resource("/api/login").route(web::post().to(login)));
    cfg.service(web::resource("/api/logout").route(web::post().to(logout)));
}

#[derive(Serialize)]
struct SessionResponse {
    success: bool,
    authenticated: bool,
    session_token: String,
    csrf_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
    confirm_password: String,
    csrf_token: String,
    #[serde(default)]
    local_progress: Option<HashMap<String, LocalProgressEntry>>,
    #[serde(default)]
    local_easter_eggs: Option<Vec<LocalEasterEgg>>,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
    csrf_token: String,
    #[serde(default)]
    local_progress: Option<HashMap<String, LocalProgressEntry>>,
    #[serde(default)]
    local_easter_eggs: Option<Vec<LocalEasterEgg>>,
}

#[derive(Deserialize)]
struct LogoutRequest {
    csrf_token: String,
}

#[derive(Serialize)]
struct AuthResponse {
    success: bool,
    message: String,
    user: User,
    csrf_token: String,
}

/// GET /api/session - return the caller's session, creating an anonymous one
/// when the bearer token is missing or stale.
async fn get_session(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let session = match optional_session(&state, &req)? {
        Some(s) => s,
        None => state
            .db
            .create_session(state.config.session_lifetime_hours)?,
    };

    let user = match session.user_id {
        Some(user_id) => state.db.get_user_by_id(user_id)?,
        None => None,
    };

    Ok(HttpResponse::Ok().json(SessionResponse {
        success: true,
        authenticated: user.is_some(),
        session_token: session.token,
        csrf_token: session.csrf_token,
        user,
    }))
}

/// Merge client-held guest progress after login/registration. Best-effort:
/// failures are logged inside the sync methods and never fail the auth flow.
fn merge_local_state(
    state: &web::Data<AppState>,
    user_id: i64,
    local_progress: &Option<HashMap<String, LocalProgressEntry>>,
    local_easter_eggs: &Option<Vec<LocalEasterEgg>>,
) {
    if let Some(progress) = local_progress {
        let applied = state.db.sync_local_progress(user_id, progress);
        if applied > 0 {
            log::info!("Merged {} local progress entries for user {}", applied, user_id);
        }
    }
    if let Some(eggs) = local_easter_eggs {
        let applied = state.db.sync_local_easter_eggs(user_id, eggs);
        if applied > 0 {
            log::info!("Merged {} local easter eggs for user {}", applied, user_id);
        }
    }
}

/// POST /api/register
async fn register(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = current_session(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let username = sanitize_input(&payload.username);
    let email = sanitize_input(&payload.email);

    if username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("All fields are required".to_string()));
    }
    if !validate_username(&username) {
        return Err(ApiError::Validation(
            "Username must be 3-20 characters: letters, numbers, underscore".to_string(),
        ));
    }
    if !validate_email(&email) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if payload.password.len() < defaults::PASSWORD_MIN_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            defaults::PASSWORD_MIN_LENGTH
        )));
    }
    if payload.password != payload.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }
    if state.db.username_exists(&username, None)? {
        return Err(ApiError::Conflict("Username is already taken".to_string()));
    }
    if state.db.email_exists(&email, None)? {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_secret(&payload.password)?;
    let user_id = state.db.create_user(&username, &email, &password_hash)?;
    state.db.initialize_user_progress(user_id)?;

    merge_local_state(&state, user_id, &payload.local_progress, &payload.local_easter_eggs);

    let session = state
        .db
        .bind_session_user(&session.token, user_id)?
        .ok_or_else(|| ApiError::Auth("Session expired during registration".to_string()))?;

    let user = state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| ApiError::Internal("Registered user vanished".to_string()))?;

    log::info!("New agent registered: {} (id {})", user.username, user.id);

    Ok(HttpResponse::Ok().json(AuthResponse {
        success: true,
        message: "Registration successful".to_string(),
        user,
        csrf_token: session.csrf_token,
    }))
}

/// POST /api/login
async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = current_session(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let username = sanitize_input(&payload.username);
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    // Single failure message: never reveal which credential was wrong
    let user = state
        .db
        .verify_login(&username, &payload.password)?
        .ok_or_else(|| ApiError::Auth("Invalid username or password".to_string()))?;

    merge_local_state(&state, user.id, &payload.local_progress, &payload.local_easter_eggs);

    let session = state
        .db
        .bind_session_user(&session.token, user.id)?
        .ok_or_else(|| ApiError::Auth("Session expired during login".to_string()))?;

    // Re-read after the merge so the response carries merged aggregates
    let user = state
        .db
        .get_user_by_id(user.id)?
        .ok_or_else(|| ApiError::Internal("Logged-in user vanished".to_string()))?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user,
        csrf_token: session.csrf_token,
    }))
}

/// POST /api/logout - destroys the session entirely; the client must fetch a
/// fresh anonymous session afterwards.
async fn logout(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<LogoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let session = current_session(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    state.db.delete_session(&session.token)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Logged out"
    })))
}
