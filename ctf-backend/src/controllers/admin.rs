//! Admin CRUD for challenges and users.
//!
//! Every route requires an admin session; every mutation also checks the
//! CSRF token. Destructive actions against the admin's own account
//! (demote, delete) are refused.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::controllers::{check_csrf, require_admin};
use crate::db::tables::challenges::{ChallengeUpdate, NewChallenge};
use crate::error::ApiError;
use crate::models::AdminChallengeDetail;
use crate::security::password::hash_secret;
use crate::security::sanitize::{
    sanitize_description, sanitize_input, validate_email, validate_flag_format, validate_username,
};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/admin/challenges")
            .route(web::get().to(list_challenges))
            .route(web::post().to(create_challenge)),
    );
    cfg.service(
        web::resource("/api/admin/challenges/{id}")
            .route(web::get().to(get_challenge))
            .route(web::put().to(update_challenge))
            .route(web::delete().to(delete_challenge)),
    );
    cfg.service(web::resource("/api/admin/users").route(web::get().to(list_users)));
    cfg.service(
        web::resource("/api/admin/users/{id}")
            .route(web::put().to(update_user))
            .route(web::delete().to(delete_user)),
    );
    cfg.service(web::resource("/api/admin/users/{id}/promote").route(web::post().to(promote_user)));
    cfg.service(web::resource("/api/admin/users/{id}/demote").route(web::post().to(demote_user)));
}

#[derive(Deserialize)]
struct ChallengePayload {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    difficulty: String,
    points: i64,
    /// Plaintext flag. On update, empty keeps the stored hash.
    #[serde(default)]
    flag: String,
    #[serde(default)]
    hint_text: String,
    #[serde(default)]
    story_chapter: String,
    #[serde(default)]
    story_order: i64,
    #[serde(default)]
    unlock_after_challenge_id: Option<i64>,
    #[serde(default)]
    is_unlocked_default: bool,
    #[serde(default)]
    easter_egg: Option<String>,
    csrf_token: String,
}

#[derive(Deserialize)]
struct UserUpdatePayload {
    username: String,
    email: String,
    csrf_token: String,
}

/// Body for mutations that carry no other fields (delete, promote, demote)
#[derive(Deserialize)]
struct CsrfOnly {
    csrf_token: String,
}

struct ValidatedChallenge {
    title: String,
    description: String,
    category: String,
    difficulty: String,
    hint_text: String,
    story_chapter: String,
    easter_egg: Option<String>,
}

/// Shared field validation and sanitization for create/update.
/// Rich-text fields go through the tag whitelist.
fn validate_challenge_fields(payload: &ChallengePayload) -> Result<ValidatedChallenge, ApiError> {
    let title = sanitize_input(&payload.title);
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }
    if payload.points <= 0 {
        return Err(ApiError::Validation("Points must be positive".to_string()));
    }

    let easter_egg = payload
        .easter_egg
        .as_deref()
        .map(sanitize_input)
        .filter(|s| !s.is_empty());

    Ok(ValidatedChallenge {
        title,
        description: sanitize_description(&payload.description),
        category: sanitize_input(&payload.category),
        difficulty: sanitize_input(&payload.difficulty),
        hint_text: sanitize_input(&payload.hint_text),
        story_chapter: sanitize_description(&payload.story_chapter),
        easter_egg,
    })
}

async fn list_challenges(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &req)?;
    let challenges: Vec<AdminChallengeDetail> = state
        .db
        .list_challenges()?
        .into_iter()
        .map(AdminChallengeDetail::from)
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "challenges": challenges
    })))
}

async fn get_challenge(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &req)?;
    let challenge = state
        .db
        .get_challenge(path.into_inner())?
        .ok_or_else(|| ApiError::NotFound("Challenge not found".to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "challenge": AdminChallengeDetail::from(challenge)
    })))
}

async fn create_challenge(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<ChallengePayload>,
) -> Result<HttpResponse, ApiError> {
    let (session, _) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let fields = validate_challenge_fields(&payload)?;

    let flag = sanitize_input(&payload.flag);
    if !validate_flag_format(&flag) {
        return Err(ApiError::Validation(
            "Flag must match FLAG{...} with letters, numbers, underscore".to_string(),
        ));
    }
    let flag_hash = hash_secret(&flag)?;

    let id = state.db.create_challenge(&NewChallenge {
        title: fields.title,
        description: fields.description,
        category: fields.category,
        difficulty: fields.difficulty,
        points: payload.points,
        flag_hash,
        hint_text: fields.hint_text,
        story_chapter: fields.story_chapter,
        story_order: payload.story_order,
        unlock_after_challenge_id: payload.unlock_after_challenge_id,
        is_unlocked_default: payload.is_unlocked_default,
        easter_egg: fields.easter_egg,
    })?;

    log::info!("Admin created challenge {}", id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "id": id
    })))
}

async fn update_challenge(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<ChallengePayload>,
) -> Result<HttpResponse, ApiError> {
    let (session, _) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let challenge_id = path.into_inner();
    let fields = validate_challenge_fields(&payload)?;

    // Empty flag keeps the existing hash; a new flag must pass format checks
    let flag = sanitize_input(&payload.flag);
    let flag_hash = if flag.is_empty() {
        None
    } else {
        if !validate_flag_format(&flag) {
            return Err(ApiError::Validation(
                "Flag must match FLAG{...} with letters, numbers, underscore".to_string(),
            ));
        }
        Some(hash_secret(&flag)?)
    };

    let updated = state.db.update_challenge(
        challenge_id,
        &ChallengeUpdate {
            title: fields.title,
            description: fields.description,
            category: fields.category,
            difficulty: fields.difficulty,
            points: payload.points,
            flag_hash,
            hint_text: fields.hint_text,
            story_chapter: fields.story_chapter,
            story_order: payload.story_order,
            unlock_after_challenge_id: payload.unlock_after_challenge_id,
            is_unlocked_default: payload.is_unlocked_default,
            easter_egg: fields.easter_egg,
        },
    )?;
    if !updated {
        return Err(ApiError::NotFound("Challenge not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Challenge updated"
    })))
}

async fn delete_challenge(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<CsrfOnly>,
) -> Result<HttpResponse, ApiError> {
    let (session, _) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let challenge_id = path.into_inner();
    if !state.db.delete_challenge_cascade(challenge_id)? {
        return Err(ApiError::NotFound("Challenge not found".to_string()));
    }

    log::info!("Admin deleted challenge {}", challenge_id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Challenge deleted"
    })))
}

async fn list_users(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    require_admin(&state, &req)?;
    let users = state.db.list_users()?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "users": users
    })))
}

async fn update_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<UserUpdatePayload>,
) -> Result<HttpResponse, ApiError> {
    let (session, _) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let user_id = path.into_inner();
    let username = sanitize_input(&payload.username);
    let email = sanitize_input(&payload.email);

    if !validate_username(&username) {
        return Err(ApiError::Validation(
            "Username must be 3-20 characters: letters, numbers, underscore".to_string(),
        ));
    }
    if !validate_email(&email) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if state.db.username_exists(&username, Some(user_id))? {
        return Err(ApiError::Conflict("Username is already taken".to_string()));
    }
    if state.db.email_exists(&email, Some(user_id))? {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    if !state.db.update_user(user_id, &username, &email)? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "User updated"
    })))
}

async fn promote_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<CsrfOnly>,
) -> Result<HttpResponse, ApiError> {
    let (session, _) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let user_id = path.into_inner();
    if !state.db.set_user_admin(user_id, true)? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    log::info!("Admin promoted user {}", user_id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "User promoted to admin"
    })))
}

async fn demote_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<CsrfOnly>,
) -> Result<HttpResponse, ApiError> {
    let (session, admin) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let user_id = path.into_inner();
    if user_id == admin.id {
        return Err(ApiError::SelfAction(
            "You cannot remove your own admin privileges".to_string(),
        ));
    }
    if !state.db.set_user_admin(user_id, false)? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Admin privileges removed"
    })))
}

async fn delete_user(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<CsrfOnly>,
) -> Result<HttpResponse, ApiError> {
    let (session, admin) = require_admin(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let user_id = path.into_inner();
    if user_id == admin.id {
        return Err(ApiError::SelfAction(
            "You cannot delete your own account".to_string(),
        ));
    }
    if !state.db.delete_user_cascade(user_id)? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    log::info!("Admin deleted user {}", user_id);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "User deleted"
    })))
}
