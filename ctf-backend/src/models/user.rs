use serde::Serialize;

/// Public user snapshot - never includes the credential hash
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub total_score: i64,
    /// Percent completed, rounded to 2 decimals
    pub total_progress: f64,
    pub current_level: i64,
    pub agent_rank: String,
    pub is_admin: bool,
    pub created_at: String,
    pub last_login: Option<String>,
}

/// Aggregate statistics for a user's dashboard
#[derive(Debug, Clone, Serialize)]
pub struct UserStatistics {
    pub completed_challenges: i64,
    pub unlocked_challenges: i64,
    pub total_challenges: i64,
    pub total_points: i64,
    pub easter_eggs_found: i64,
    pub log_entries: i64,
}
