//! Database operations for the `sessions` table.
//!
//! Sessions are bearer tokens. A session starts anonymous (no user) so guests
//! can obtain a CSRF token before registering; login or registration binds
//! the user and rotates the CSRF token.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Database;
use crate::models::Session;
use crate::security::csrf;

fn parse_timestamp(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                raw.len(),
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        token: row.get(1)?,
        user_id: row.get(2)?,
        csrf_token: row.get(3)?,
        created_at: parse_timestamp(&row.get::<_, String>(4)?)?,
        expires_at: parse_timestamp(&row.get::<_, String>(5)?)?,
    })
}

const SESSION_COLUMNS: &str = "id, token, user_id, csrf_token, created_at, expires_at";

impl Database {
    /// Create a fresh anonymous session with a new CSRF token
    pub fn create_session(&self, lifetime_hours: i64) -> rusqlite::Result<Session> {
        let token = Uuid::new_v4().to_string();
        let csrf_token = csrf::generate_token();
        let now = Utc::now();
        let expires_at = now + Duration::hours(lifetime_hours);

        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (token, user_id, csrf_token, created_at, expires_at)
             VALUES (?1, NULL, ?2, ?3, ?4)",
            params![token, csrf_token, now.to_rfc3339(), expires_at.to_rfc3339()],
        )?;

        Ok(Session {
            id: conn.last_insert_rowid(),
            token,
            user_id: None,
            csrf_token,
            created_at: now,
            expires_at,
        })
    }

    /// Look up a session by bearer token. Expired sessions are treated as
    /// absent and removed on sight.
    pub fn validate_session(&self, token: &str) -> rusqlite::Result<Option<Session>> {
        let session = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sessions WHERE token = ?1",
                SESSION_COLUMNS
            ))?;
            stmt.query_row(params![token], session_from_row).optional()?
        };

        match session {
            Some(s) if s.expires_at <= Utc::now() => {
                self.delete_session(&s.token)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Bind a user to a session and rotate its CSRF token. Returns the
    /// updated session, or None if the token no longer exists.
    pub fn bind_session_user(
        &self,
        token: &str,
        user_id: i64,
    ) -> rusqlite::Result<Option<Session>> {
        let csrf_token = csrf::generate_token();
        {
            let conn = self.conn();
            let updated = conn.execute(
                "UPDATE sessions SET user_id = ?1, csrf_token = ?2 WHERE token = ?3",
                params![user_id, csrf_token, token],
            )?;
            if updated == 0 {
                return Ok(None);
            }
        }
        self.validate_session(token)
    }

    pub fn delete_session(&self, token: &str) -> rusqlite::Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(deleted > 0)
    }

    /// Remove every expired session. Called at startup.
    pub fn purge_expired_sessions(&self) -> rusqlite::Result<usize> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![Utc::now().to_rfc3339()],
        )
    }
}
