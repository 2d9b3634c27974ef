//! Dashboard endpoints: aggregate statistics, narrative logs, and
//! discovered easter eggs for the logged-in user.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::controllers::require_user;
use crate::db::tables::agent_logs::AgentLog;
use crate::db::tables::easter_eggs::DiscoveredEasterEgg;
use crate::error::ApiError;
use crate::models::{User, UserStatistics};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/stats").route(web::get().to(get_stats)));
    cfg.service(web::resource("/api/logs").route(web::get().to(get_logs)));
}

#[derive(Serialize)]
struct StatsResponse {
    success: bool,
    user: User,
    statistics: UserStatistics,
    logs: Vec<AgentLog>,
    easter_eggs: Vec<DiscoveredEasterEgg>,
}

async fn get_stats(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let (_, user) = require_user(&state, &req)?;

    let statistics = state.db.get_user_statistics(user.id)?;
    let logs = state.db.get_user_logs(user.id)?;
    let easter_eggs = state.db.get_user_easter_eggs(user.id)?;

    Ok(HttpResponse::Ok().json(StatsResponse {
        success: true,
        user,
        statistics,
        logs,
        easter_eggs,
    }))
}

async fn get_logs(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let (_, user) = require_user(&state, &req)?;
    let logs = state.db.get_user_logs(user.id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "logs": logs
    })))
}
