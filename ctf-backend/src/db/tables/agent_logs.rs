//! Database operations for the `agent_logs` table - the narrative log
//! entries appended when a story challenge is completed.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::Database;

/// A narrative log entry joined with its challenge for display
#[derive(Debug, Clone, Serialize)]
pub struct AgentLog {
    pub id: i64,
    pub challenge_id: i64,
    pub challenge_title: String,
    pub story_order: i64,
    pub log_entry: String,
    pub log_timestamp: String,
}

/// Free function so the completion transaction can append a log through the
/// transaction it already holds.
pub(crate) fn insert_agent_log(
    conn: &Connection,
    user_id: i64,
    challenge_id: i64,
    log_entry: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO agent_logs (user_id, challenge_id, log_entry, log_timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, challenge_id, log_entry, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl Database {
    /// Narrative logs for a user, in story order
    pub fn get_user_logs(&self, user_id: i64) -> rusqlite::Result<Vec<AgentLog>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT al.id, al.challenge_id, c.title, c.story_order,
                    al.log_entry, al.log_timestamp
             FROM agent_logs al
             JOIN challenges c ON al.challenge_id = c.id
             WHERE al.user_id = ?1
             ORDER BY c.story_order ASC, al.log_timestamp ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(AgentLog {
                id: row.get(0)?,
                challenge_id: row.get(1)?,
                challenge_title: row.get(2)?,
                story_order: row.get(3)?,
                log_entry: row.get(4)?,
                log_timestamp: row.get(5)?,
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{insert_challenge, insert_user, test_db};

    #[test]
    fn test_logs_follow_story_order() {
        let (db, _dir) = test_db();
        let late = insert_challenge(&db, "finale", 30, "FLAG{end}", 9, None, true);
        let early = insert_challenge(&db, "intro", 10, "FLAG{start}", 1, None, true);
        let user = insert_user(&db, "agent_logs");

        db.complete_challenge(user, late).unwrap();
        db.complete_challenge(user, early).unwrap();

        let logs = db.get_user_logs(user).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].challenge_title, "intro");
        assert_eq!(logs[1].challenge_title, "finale");
        assert_eq!(logs[0].log_entry, "Chapter for intro");
    }

    #[test]
    fn test_no_log_for_empty_chapter() {
        let (db, _dir) = test_db();
        let user = insert_user(&db, "agent_silent");

        // Challenge without narrative text
        let flag_hash = crate::security::password::hash_secret("FLAG{quiet}").unwrap();
        let id = db
            .create_challenge(&crate::db::tables::challenges::NewChallenge {
                title: "quiet".to_string(),
                description: String::new(),
                category: String::new(),
                difficulty: String::new(),
                points: 10,
                flag_hash,
                hint_text: String::new(),
                story_chapter: String::new(),
                story_order: 1,
                unlock_after_challenge_id: None,
                is_unlocked_default: true,
                easter_egg: None,
            })
            .unwrap();

        db.complete_challenge(user, id).unwrap();
        assert!(db.get_user_logs(user).unwrap().is_empty());
    }
}
