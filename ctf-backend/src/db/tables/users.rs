//! Database operations for the `users` table: accounts, credential
//! verification, aggregate stats, and the admin-side cascade delete.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::Database;
use crate::models::{User, UserStatistics};
use crate::security::password::verify_secret;

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        total_score: row.get(3)?,
        total_progress: row.get(4)?,
        current_level: row.get(5)?,
        agent_rank: row.get(6)?,
        is_admin: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        last_login: row.get(9)?,
    })
}

const USER_COLUMNS: &str = "id, username, email, total_score, total_progress, \
     current_level, agent_rank, is_admin, created_at, last_login";

impl Database {
    /// Insert a new user. The caller is responsible for hashing the password.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> rusqlite::Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, email, password_hash, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user_by_id(&self, user_id: i64) -> rusqlite::Result<Option<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE id = ?1",
            USER_COLUMNS
        ))?;
        stmt.query_row(params![user_id], user_from_row).optional()
    }

    pub fn username_exists(&self, username: &str, exclude_id: Option<i64>) -> rusqlite::Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 AND id != ?2",
            params![username, exclude_id.unwrap_or(0)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> rusqlite::Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2",
            params![email, exclude_id.unwrap_or(0)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Verify credentials. On success updates `last_login` and returns the
    /// user snapshot; on failure returns None without revealing which part
    /// of the credentials was wrong.
    pub fn verify_login(&self, username: &str, password: &str) -> rusqlite::Result<Option<User>> {
        let (user_id, stored_hash) = {
            let conn = self.conn();
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT id, password_hash FROM users WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some(r) => r,
                None => return Ok(None),
            }
        };

        if !verify_secret(password, &stored_hash) {
            return Ok(None);
        }

        {
            let conn = self.conn();
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), user_id],
            )?;
        }

        self.get_user_by_id(user_id)
    }

    pub fn list_users(&self) -> rusqlite::Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY id",
            USER_COLUMNS
        ))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect()
    }

    pub fn update_user(&self, user_id: i64, username: &str, email: &str) -> rusqlite::Result<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE users SET username = ?1, email = ?2 WHERE id = ?3",
            params![username, email, user_id],
        )?;
        Ok(updated > 0)
    }

    pub fn set_user_admin(&self, user_id: i64, is_admin: bool) -> rusqlite::Result<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE users SET is_admin = ?1 WHERE id = ?2",
            params![is_admin as i64, user_id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a user and every dependent row (progress, narrative logs,
    /// easter eggs, sessions) in one transaction.
    pub fn delete_user_cascade(&self, user_id: i64) -> rusqlite::Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM user_progress WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.execute("DELETE FROM agent_logs WHERE user_id = ?1", params![user_id])?;
        tx.execute(
            "DELETE FROM discovered_easter_eggs WHERE user_id = ?1",
            params![user_id],
        )?;
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        let deleted = tx.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;

        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn get_user_statistics(&self, user_id: i64) -> rusqlite::Result<UserStatistics> {
        let conn = self.conn();
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM user_progress WHERE user_id = ?1 AND status = 'completed'),
                (SELECT COUNT(*) FROM user_progress WHERE user_id = ?1 AND status = 'unlocked'),
                (SELECT COUNT(*) FROM challenges),
                (SELECT COALESCE(SUM(c.points), 0) FROM user_progress up
                    JOIN challenges c ON up.challenge_id = c.id
                    WHERE up.user_id = ?1 AND up.status = 'completed'),
                (SELECT COUNT(*) FROM discovered_easter_eggs WHERE user_id = ?1),
                (SELECT COUNT(*) FROM agent_logs WHERE user_id = ?1)",
            params![user_id],
            |row| {
                Ok(UserStatistics {
                    completed_challenges: row.get(0)?,
                    unlocked_challenges: row.get(1)?,
                    total_challenges: row.get(2)?,
                    total_points: row.get(3)?,
                    easter_eggs_found: row.get(4)?,
                    log_entries: row.get(5)?,
                })
            },
        )
    }
}
