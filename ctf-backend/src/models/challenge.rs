use serde::Serialize;

use crate::models::ProgressStatus;

/// Challenge definition as stored. The flag hash is deliberately not part of
/// this struct - it is only ever read inside flag verification.
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub points: i64,
    pub hint_text: String,
    pub story_chapter: String,
    pub story_order: i64,
    pub unlock_after_challenge_id: Option<i64>,
    pub is_unlocked_default: bool,
    /// Bonus secret; never serialized to players
    #[serde(skip_serializing)]
    pub easter_egg: Option<String>,
    pub created_at: String,
}

/// Challenge annotated with the caller's per-challenge progress
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeWithStatus {
    #[serde(flatten)]
    pub challenge: Challenge,
    pub user_status: ProgressStatus,
    pub attempts: i64,
    pub completed_at: Option<String>,
}

/// Admin detail view: everything except the flag hash, plus a marker that a
/// flag is set so the edit form can leave it blank to keep the old one.
#[derive(Debug, Clone, Serialize)]
pub struct AdminChallengeDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub points: i64,
    pub hint_text: String,
    pub story_chapter: String,
    pub story_order: i64,
    pub unlock_after_challenge_id: Option<i64>,
    pub is_unlocked_default: bool,
    pub easter_egg: Option<String>,
    pub created_at: String,
    pub has_flag: bool,
}

impl From<Challenge> for AdminChallengeDetail {
    fn from(c: Challenge) -> Self {
        Self {
            id: c.id,
            title: c.title,
            description: c.description,
            category: c.category,
            difficulty: c.difficulty,
            points: c.points,
            hint_text: c.hint_text,
            story_chapter: c.story_chapter,
            story_order: c.story_order,
            unlock_after_challenge_id: c.unlock_after_challenge_id,
            is_unlocked_default: c.is_unlocked_default,
            easter_egg: c.easter_egg,
            created_at: c.created_at,
            has_flag: true,
        }
    }
}
