//! Challenge listing, flag submission, and easter egg discovery.
//!
//! An incorrect flag is a normal negative outcome: HTTP 200 with
//! `success: false`. Errors are reserved for malformed requests, missing
//! challenges, and auth failures.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::config::EASTER_EGG_BONUS_POINTS;
use crate::controllers::{check_csrf, current_session, optional_session, require_user};
use crate::error::ApiError;
use crate::models::{ChallengeWithStatus, ProgressStatus, User, UserStatistics};
use crate::security::sanitize::sanitize_input;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/challenges").route(web::get().to(list_challenges)));
    cfg.service(web::resource("/api/flags").route(web::post().to(submit_flag)));
    cfg.service(web::resource("/api/easter-eggs").route(web::post().to(submit_easter_egg)));
}

#[derive(Serialize)]
struct ChallengeListResponse {
    success: bool,
    challenges: Vec<ChallengeWithStatus>,
}

#[derive(Deserialize)]
struct FlagSubmission {
    challenge_id: i64,
    flag: String,
    csrf_token: String,
}

#[derive(Serialize)]
struct FlagResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    points: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    story_chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<UserStatistics>,
}

impl FlagResponse {
    fn incorrect() -> Self {
        Self {
            success: false,
            message: "Incorrect flag. Try again.".to_string(),
            already_completed: None,
            points: None,
            story_chapter: None,
            user: None,
            stats: None,
        }
    }
}

#[derive(Deserialize)]
struct EasterEggSubmission {
    challenge_id: i64,
    code: String,
    csrf_token: String,
}

/// GET /api/challenges - full list in story order, annotated with the
/// caller's progress. Guests see default statuses with zero attempts.
async fn list_challenges(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = optional_session(&state, &req)?.and_then(|s| s.user_id);

    let challenges = state.db.list_challenges()?;
    let progress = match user_id {
        Some(uid) => state.db.get_user_progress(uid)?,
        None => Vec::new(),
    };

    let annotated = challenges
        .into_iter()
        .map(|challenge| {
            let row = progress.iter().find(|p| p.challenge_id == challenge.id);
            let default_status = if challenge.is_unlocked_default {
                ProgressStatus::Unlocked
            } else {
                ProgressStatus::Locked
            };
            ChallengeWithStatus {
                user_status: row.map(|p| p.status).unwrap_or(default_status),
                attempts: row.map(|p| p.attempts).unwrap_or(0),
                completed_at: row.and_then(|p| p.completed_at.clone()),
                challenge,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(ChallengeListResponse {
        success: true,
        challenges: annotated,
    }))
}

/// POST /api/flags - verify a submitted flag.
///
/// Verification comes first; only a valid flag is allowed to branch on the
/// pair's state. A wrong flag always reports failure and counts an attempt,
/// even against a completed pair. Authenticated callers get the full
/// completion procedure; guests get the verdict, points, and narrative
/// without any server-side persistence.
async fn submit_flag(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<FlagSubmission>,
) -> Result<HttpResponse, ApiError> {
    let session = current_session(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let flag = sanitize_input(&payload.flag);
    if flag.is_empty() {
        return Err(ApiError::Validation("Flag is required".to_string()));
    }

    let challenge = state
        .db
        .get_challenge(payload.challenge_id)?
        .ok_or_else(|| ApiError::NotFound("Challenge not found".to_string()))?;

    let valid = state.db.verify_flag(challenge.id, &flag)?;
    let story_chapter =
        (!challenge.story_chapter.is_empty()).then(|| challenge.story_chapter.clone());

    if let Some(user_id) = session.user_id {
        if !valid {
            state.db.increment_attempts(user_id, challenge.id)?;
            return Ok(HttpResponse::Ok().json(FlagResponse::incorrect()));
        }

        let status = state
            .db
            .get_challenge_progress(user_id, challenge.id)?
            .map(|p| p.status)
            .unwrap_or(ProgressStatus::Locked);

        if status == ProgressStatus::Completed {
            // No points on resubmission, but replay the narrative
            let user = state.db.get_user_by_id(user_id)?;
            let stats = state.db.get_user_statistics(user_id)?;
            return Ok(HttpResponse::Ok().json(FlagResponse {
                success: true,
                message: "Challenge already completed".to_string(),
                already_completed: Some(true),
                points: Some(0),
                story_chapter,
                user,
                stats: Some(stats),
            }));
        }

        state.db.complete_challenge(user_id, challenge.id)?;
        let user = state.db.get_user_by_id(user_id)?;
        let stats = state.db.get_user_statistics(user_id)?;

        return Ok(HttpResponse::Ok().json(FlagResponse {
            success: true,
            message: format!("Correct! {} points awarded.", challenge.points),
            already_completed: None,
            points: Some(challenge.points),
            story_chapter,
            user,
            stats: Some(stats),
        }));
    }

    // Guest path: verdict only, nothing persisted
    if !valid {
        return Ok(HttpResponse::Ok().json(FlagResponse::incorrect()));
    }

    Ok(HttpResponse::Ok().json(FlagResponse {
        success: true,
        message: format!(
            "Correct! Register to save your progress and claim {} points.",
            challenge.points
        ),
        already_completed: None,
        points: Some(challenge.points),
        story_chapter,
        user: None,
        stats: None,
    }))
}

/// POST /api/easter-eggs - redeem a hidden code. Login required; a wrong
/// code is a 200 with `success: false`, same as a wrong flag.
async fn submit_easter_egg(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<EasterEggSubmission>,
) -> Result<HttpResponse, ApiError> {
    let (session, user) = require_user(&state, &req)?;
    check_csrf(&session, &payload.csrf_token)?;

    let code = sanitize_input(&payload.code);
    if code.is_empty() {
        return Err(ApiError::Validation("Code is required".to_string()));
    }

    let challenge = state
        .db
        .get_challenge(payload.challenge_id)?
        .ok_or_else(|| ApiError::NotFound("Challenge not found".to_string()))?;

    match &challenge.easter_egg {
        Some(expected) if *expected == code => {
            state.db.discover_easter_egg(user.id, challenge.id, &code)?;
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "Easter egg discovered!",
                "bonus_points": EASTER_EGG_BONUS_POINTS
            })))
        }
        _ => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": false,
            "message": "Nothing happens."
        }))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{test, web, App};
    use serde_json::{json, Value};

    use crate::config::Config;
    use crate::db::test_support::{insert_challenge, insert_user, pair_status, test_db};
    use crate::db::Database;
    use crate::models::{ProgressStatus, Session};
    use crate::AppState;

    fn test_state(db: Arc<Database>) -> web::Data<AppState> {
        web::Data::new(AppState {
            db,
            config: Config {
                port: 0,
                database_url: String::new(),
                debug_mode: false,
                session_lifetime_hours: 24,
            },
        })
    }

    fn logged_in_session(db: &Database, user_id: i64) -> Session {
        let session = db.create_session(24).expect("create session");
        db.bind_session_user(&session.token, user_id)
            .expect("bind session")
            .expect("session exists")
    }

    fn flag_request(session: &Session, challenge_id: i64, flag: &str) -> actix_web::test::TestRequest {
        test::TestRequest::post()
            .uri("/api/flags")
            .insert_header(("Authorization", format!("Bearer {}", session.token)))
            .set_json(json!({
                "challenge_id": challenge_id,
                "flag": flag,
                "csrf_token": session.csrf_token,
            }))
    }

    #[actix_web::test]
    async fn test_wrong_flag_on_completed_pair_reports_failure() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "done", 10, "FLAG{done}", 1, None, true);
        let user = insert_user(&db, "agent_wrong");
        db.complete_challenge(user, ch).unwrap();
        let session = logged_in_session(&db, user);

        let db = Arc::new(db);
        let app = test::init_service(
            App::new()
                .app_data(test_state(Arc::clone(&db)))
                .configure(super::config),
        )
        .await;

        let req = flag_request(&session, ch, "FLAG{totally_wrong}").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        // Wrong flag is a failure even though the pair is completed
        assert_eq!(body["success"], json!(false));
        assert!(body.get("already_completed").is_none());

        let row = db.get_challenge_progress(user, ch).unwrap().unwrap();
        assert_eq!(row.attempts, 1);
        assert_eq!(row.status, ProgressStatus::Completed);
    }

    #[actix_web::test]
    async fn test_resubmitting_correct_flag_reports_already_completed() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "done", 10, "FLAG{done}", 1, None, true);
        let user = insert_user(&db, "agent_again");
        let session = logged_in_session(&db, user);

        let db = Arc::new(db);
        let app = test::init_service(
            App::new()
                .app_data(test_state(Arc::clone(&db)))
                .configure(super::config),
        )
        .await;

        let req = flag_request(&session, ch, "FLAG{done}").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["points"], json!(10));
        assert_eq!(body["user"]["total_score"], json!(10));
        assert_eq!(body["stats"]["completed_challenges"], json!(1));

        let req = flag_request(&session, ch, "FLAG{done}").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["already_completed"], json!(true));
        assert_eq!(body["points"], json!(0));
        // Aggregates come back unchanged - no double scoring
        assert_eq!(body["user"]["total_score"], json!(10));
        assert_eq!(body["stats"]["completed_challenges"], json!(1));
    }

    #[actix_web::test]
    async fn test_valid_flag_completes_locked_pair() {
        let (db, _dir) = test_db();
        let first = insert_challenge(&db, "first", 10, "FLAG{first}", 1, None, true);
        let gated = insert_challenge(&db, "gated", 20, "FLAG{gated}", 2, Some(first), false);
        let user = insert_user(&db, "agent_gated");
        let session = logged_in_session(&db, user);

        let db = Arc::new(db);
        let app = test::init_service(
            App::new()
                .app_data(test_state(Arc::clone(&db)))
                .configure(super::config),
        )
        .await;

        // The pair is locked, but verification alone decides
        let req = flag_request(&session, gated, "FLAG{gated}").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["points"], json!(20));

        assert_eq!(pair_status(&db, user, gated), ProgressStatus::Completed);
    }
}
