//! Database operations for the `challenges` table, including flag
//! verification against the stored hash and the admin cascade delete.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::Database;
use crate::models::Challenge;
use crate::security::password::verify_secret;

/// Fields for challenge creation. `flag_hash` is already hashed - plaintext
/// flags never reach the persistence layer.
#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub points: i64,
    pub flag_hash: String,
    pub hint_text: String,
    pub story_chapter: String,
    pub story_order: i64,
    pub unlock_after_challenge_id: Option<i64>,
    pub is_unlocked_default: bool,
    pub easter_egg: Option<String>,
}

/// Fields for challenge update. `flag_hash: None` keeps the existing hash.
#[derive(Debug, Clone)]
pub struct ChallengeUpdate {
    pub title: String,
    pub description: String,
    pub category: String,
    pub difficulty: String,
    pub points: i64,
    pub flag_hash: Option<String>,
    pub hint_text: String,
    pub story_chapter: String,
    pub story_order: i64,
    pub unlock_after_challenge_id: Option<i64>,
    pub is_unlocked_default: bool,
    pub easter_egg: Option<String>,
}

fn challenge_from_row(row: &Row) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        difficulty: row.get(4)?,
        points: row.get(5)?,
        hint_text: row.get(6)?,
        story_chapter: row.get(7)?,
        story_order: row.get(8)?,
        unlock_after_challenge_id: row.get(9)?,
        is_unlocked_default: row.get::<_, i64>(10)? != 0,
        easter_egg: row.get(11)?,
        created_at: row.get(12)?,
    })
}

const CHALLENGE_COLUMNS: &str = "id, title, description, category, difficulty, points, \
     hint_text, story_chapter, story_order, unlock_after_challenge_id, \
     is_unlocked_default, easter_egg, created_at";

impl Database {
    pub fn list_challenges(&self) -> rusqlite::Result<Vec<Challenge>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM challenges ORDER BY story_order ASC",
            CHALLENGE_COLUMNS
        ))?;
        let rows = stmt.query_map([], challenge_from_row)?;
        rows.collect()
    }

    pub fn get_challenge(&self, challenge_id: i64) -> rusqlite::Result<Option<Challenge>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM challenges WHERE id = ?1",
            CHALLENGE_COLUMNS
        ))?;
        stmt.query_row(params![challenge_id], challenge_from_row)
            .optional()
    }

    pub fn create_challenge(&self, new: &NewChallenge) -> rusqlite::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO challenges (
                title, description, category, difficulty, points, flag_hash,
                hint_text, story_chapter, story_order, unlock_after_challenge_id,
                is_unlocked_default, easter_egg, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                new.title,
                new.description,
                new.category,
                new.difficulty,
                new.points,
                new.flag_hash,
                new.hint_text,
                new.story_chapter,
                new.story_order,
                new.unlock_after_challenge_id,
                new.is_unlocked_default as i64,
                new.easter_egg,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_challenge(
        &self,
        challenge_id: i64,
        update: &ChallengeUpdate,
    ) -> rusqlite::Result<bool> {
        let conn = self.conn();
        let updated = match &update.flag_hash {
            Some(flag_hash) => conn.execute(
                "UPDATE challenges SET
                    title = ?1, description = ?2, category = ?3, difficulty = ?4,
                    points = ?5, flag_hash = ?6, hint_text = ?7, story_chapter = ?8,
                    story_order = ?9, unlock_after_challenge_id = ?10,
                    is_unlocked_default = ?11, easter_egg = ?12
                 WHERE id = ?13",
                params![
                    update.title,
                    update.description,
                    update.category,
                    update.difficulty,
                    update.points,
                    flag_hash,
                    update.hint_text,
                    update.story_chapter,
                    update.story_order,
                    update.unlock_after_challenge_id,
                    update.is_unlocked_default as i64,
                    update.easter_egg,
                    challenge_id,
                ],
            )?,
            None => conn.execute(
                "UPDATE challenges SET
                    title = ?1, description = ?2, category = ?3, difficulty = ?4,
                    points = ?5, hint_text = ?6, story_chapter = ?7,
                    story_order = ?8, unlock_after_challenge_id = ?9,
                    is_unlocked_default = ?10, easter_egg = ?11
                 WHERE id = ?12",
                params![
                    update.title,
                    update.description,
                    update.category,
                    update.difficulty,
                    update.points,
                    update.hint_text,
                    update.story_chapter,
                    update.story_order,
                    update.unlock_after_challenge_id,
                    update.is_unlocked_default as i64,
                    update.easter_egg,
                    challenge_id,
                ],
            )?,
        };
        Ok(updated > 0)
    }

    /// Delete a challenge and every dependent row (progress, narrative logs,
    /// easter eggs) in one transaction. Partial deletion must never persist.
    pub fn delete_challenge_cascade(&self, challenge_id: i64) -> rusqlite::Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM user_progress WHERE challenge_id = ?1",
            params![challenge_id],
        )?;
        tx.execute(
            "DELETE FROM agent_logs WHERE challenge_id = ?1",
            params![challenge_id],
        )?;
        tx.execute(
            "DELETE FROM discovered_easter_eggs WHERE challenge_id = ?1",
            params![challenge_id],
        )?;
        let deleted = tx.execute("DELETE FROM challenges WHERE id = ?1", params![challenge_id])?;

        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Verify a submitted flag against the challenge's stored hash.
    /// An absent challenge verifies as false.
    pub fn verify_flag(&self, challenge_id: i64, candidate: &str) -> rusqlite::Result<bool> {
        let stored_hash: Option<String> = {
            let conn = self.conn();
            conn.query_row(
                "SELECT flag_hash FROM challenges WHERE id = ?1",
                params![challenge_id],
                |row| row.get(0),
            )
            .optional()?
        };

        Ok(match stored_hash {
            Some(hash) => verify_secret(candidate, &hash),
            None => false,
        })
    }
}
