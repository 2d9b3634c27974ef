//! Database operations for the `user_progress` table - the progress engine.
//!
//! Per (user, challenge) pair the status moves locked -> unlocked ->
//! completed and never backward. Completion runs as one transaction: status
//! write, unlock cascade, narrative log, aggregate recompute. The local
//! snapshot merge replays client-held guest progress through the same paths,
//! best-effort per entry.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::tables::agent_logs::insert_agent_log;
use crate::db::Database;
use crate::models::progress::LocalProgressEntry;
use crate::models::{ProgressRow, ProgressStatus};

fn progress_from_row(row: &rusqlite::Row) -> rusqlite::Result<ProgressRow> {
    Ok(ProgressRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        challenge_id: row.get(2)?,
        status: ProgressStatus::parse(&row.get::<_, String>(3)?),
        attempts: row.get(4)?,
        completed_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Read the pair's current status within the given connection/transaction
fn read_status(
    conn: &Connection,
    user_id: i64,
    challenge_id: i64,
) -> rusqlite::Result<Option<ProgressStatus>> {
    conn.query_row(
        "SELECT status FROM user_progress WHERE user_id = ?1 AND challenge_id = ?2",
        params![user_id, challenge_id],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map(|opt| opt.map(|s| ProgressStatus::parse(&s)))
}

/// Explicit read-modify-write upsert. Creates the row if absent; upgrades the
/// status only when the new rank is strictly higher. Returns whether a write
/// happened.
fn write_status(
    conn: &Connection,
    user_id: i64,
    challenge_id: i64,
    status: ProgressStatus,
) -> rusqlite::Result<bool> {
    let now = Utc::now().to_rfc3339();
    let completed_at = (status == ProgressStatus::Completed).then(|| now.clone());

    match read_status(conn, user_id, challenge_id)? {
        None => {
            conn.execute(
                "INSERT INTO user_progress
                    (user_id, challenge_id, status, attempts, completed_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)",
                params![user_id, challenge_id, status.as_str(), completed_at, now],
            )?;
            Ok(true)
        }
        Some(current) if status.rank() > current.rank() => {
            conn.execute(
                "UPDATE user_progress
                 SET status = ?1, completed_at = COALESCE(completed_at, ?2), updated_at = ?3
                 WHERE user_id = ?4 AND challenge_id = ?5",
                params![status.as_str(), completed_at, now, user_id, challenge_id],
            )?;
            Ok(true)
        }
        Some(_) => Ok(false),
    }
}

/// Completion procedure, run inside the caller's transaction:
/// (a) mark the pair completed, (b) unlock the dependent challenge,
/// (c) append the narrative log, (d) recompute the user's aggregates.
fn complete_in_tx(conn: &Connection, user_id: i64, challenge_id: i64) -> rusqlite::Result<()> {
    let (story_order, story_chapter): (i64, String) = conn.query_row(
        "SELECT story_order, story_chapter FROM challenges WHERE id = ?1",
        params![challenge_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let newly_completed = write_status(conn, user_id, challenge_id, ProgressStatus::Completed)?;

    // Single unlock target: first challenge gated behind this one
    let next: Option<i64> = conn
        .query_row(
            "SELECT id FROM challenges WHERE unlock_after_challenge_id = ?1 ORDER BY id LIMIT 1",
            params![challenge_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(next_id) = next {
        let current = read_status(conn, user_id, next_id)?.unwrap_or(ProgressStatus::Locked);
        if current == ProgressStatus::Locked {
            write_status(conn, user_id, next_id, ProgressStatus::Unlocked)?;
        }
    }

    if newly_completed && !story_chapter.is_empty() {
        insert_agent_log(conn, user_id, challenge_id, &story_chapter)?;
    }

    // Recompute aggregates from completed rows rather than incrementing,
    // so replays and concurrent completions cannot double-count
    let total_score: i64 = conn.query_row(
        "SELECT COALESCE(SUM(c.points), 0) FROM user_progress up
         JOIN challenges c ON up.challenge_id = c.id
         WHERE up.user_id = ?1 AND up.status = 'completed'",
        params![user_id],
        |row| row.get(0),
    )?;
    let completed_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM user_progress WHERE user_id = ?1 AND status = 'completed'",
        params![user_id],
        |row| row.get(0),
    )?;
    let total_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM challenges", [], |row| row.get(0))?;

    let total_progress = if total_count > 0 {
        (completed_count as f64 * 100.0 / total_count as f64 * 100.0).round() / 100.0
    } else {
        0.0
    };

    conn.execute(
        "UPDATE users
         SET total_score = ?1, total_progress = ?2, current_level = ?3
         WHERE id = ?4",
        params![total_score, total_progress, story_order, user_id],
    )?;

    Ok(())
}

impl Database {
    /// Create one progress row per challenge for a fresh user. Default status
    /// comes from the challenge's is_unlocked_default flag; existing rows are
    /// left untouched.
    pub fn initialize_user_progress(&self, user_id: i64) -> rusqlite::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let defaults: Vec<(i64, bool)> = {
            let mut stmt =
                tx.prepare("SELECT id, is_unlocked_default FROM challenges ORDER BY story_order")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get::<_, i64>(1)? != 0))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        for (challenge_id, unlocked) in defaults {
            if read_status(&tx, user_id, challenge_id)?.is_none() {
                let status = if unlocked {
                    ProgressStatus::Unlocked
                } else {
                    ProgressStatus::Locked
                };
                write_status(&tx, user_id, challenge_id, status)?;
            }
        }

        tx.commit()
    }

    pub fn get_user_progress(&self, user_id: i64) -> rusqlite::Result<Vec<ProgressRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT up.id, up.user_id, up.challenge_id, up.status, up.attempts,
                    up.completed_at, up.updated_at
             FROM user_progress up
             JOIN challenges c ON up.challenge_id = c.id
             WHERE up.user_id = ?1
             ORDER BY c.story_order ASC",
        )?;
        let rows = stmt.query_map(params![user_id], progress_from_row)?;
        rows.collect()
    }

    pub fn get_challenge_progress(
        &self,
        user_id: i64,
        challenge_id: i64,
    ) -> rusqlite::Result<Option<ProgressRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, challenge_id, status, attempts, completed_at, updated_at
             FROM user_progress WHERE user_id = ?1 AND challenge_id = ?2",
        )?;
        stmt.query_row(params![user_id, challenge_id], progress_from_row)
            .optional()
    }

    /// Count a failed attempt. Only touches an existing row - guest
    /// submissions are never persisted.
    pub fn increment_attempts(&self, user_id: i64, challenge_id: i64) -> rusqlite::Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE user_progress SET attempts = attempts + 1
             WHERE user_id = ?1 AND challenge_id = ?2",
            params![user_id, challenge_id],
        )?;
        Ok(())
    }

    /// Non-completion status upgrade (merge path). Never downgrades.
    pub fn upgrade_status(
        &self,
        user_id: i64,
        challenge_id: i64,
        status: ProgressStatus,
    ) -> rusqlite::Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = write_status(&tx, user_id, challenge_id, status)?;
        tx.commit()?;
        Ok(changed)
    }

    /// Complete a challenge for a user: one atomic transaction covering the
    /// status write, unlock cascade, narrative log, and aggregate recompute.
    pub fn complete_challenge(&self, user_id: i64, challenge_id: i64) -> rusqlite::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        complete_in_tx(&tx, user_id, challenge_id)?;
        tx.commit()
    }

    /// Merge an anonymous session's client-held progress into the server
    /// state. Higher-ranked local status wins; completion entries run the
    /// full completion procedure without flag re-verification (trust boundary
    /// accepted by design). Best-effort per entry: a failing entry is logged
    /// and skipped, and never aborts the surrounding login/register.
    ///
    /// Returns the number of entries applied.
    pub fn sync_local_progress(
        &self,
        user_id: i64,
        local: &HashMap<String, LocalProgressEntry>,
    ) -> usize {
        let mut entries: Vec<(i64, &LocalProgressEntry)> = local
            .iter()
            .filter_map(|(key, entry)| key.parse::<i64>().ok().map(|id| (id, entry)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);

        let mut applied = 0;
        for (challenge_id, entry) in entries {
            let local_status = entry.status();

            let server_status = match self.get_challenge_progress(user_id, challenge_id) {
                Ok(row) => row.map(|p| p.status).unwrap_or(ProgressStatus::Locked),
                Err(e) => {
                    log::warn!(
                        "Progress merge: failed to read challenge {} for user {}: {}",
                        challenge_id,
                        user_id,
                        e
                    );
                    continue;
                }
            };

            if local_status.rank() <= server_status.rank() {
                continue;
            }

            let result = if local_status == ProgressStatus::Completed {
                self.complete_challenge(user_id, challenge_id)
            } else {
                self.upgrade_status(user_id, challenge_id, local_status)
                    .map(|_| ())
            };

            match result {
                Ok(()) => applied += 1,
                Err(e) => log::warn!(
                    "Progress merge: failed to apply challenge {} for user {}: {}",
                    challenge_id,
                    user_id,
                    e
                ),
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_challenge, insert_user, pair_status, test_db};

    #[test]
    fn test_initialize_respects_default_unlock() {
        let (db, _dir) = test_db();
        let open = insert_challenge(&db, "open", 10, "FLAG{open}", 1, None, true);
        let gated = insert_challenge(&db, "gated", 20, "FLAG{gated}", 2, Some(open), false);
        let user = insert_user(&db, "agent_init");

        assert_eq!(pair_status(&db, user, open), ProgressStatus::Unlocked);
        assert_eq!(pair_status(&db, user, gated), ProgressStatus::Locked);
    }

    #[test]
    fn test_status_never_moves_backward() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "only", 10, "FLAG{only}", 1, None, true);
        let user = insert_user(&db, "agent_fwd");

        db.complete_challenge(user, ch).unwrap();
        assert_eq!(pair_status(&db, user, ch), ProgressStatus::Completed);

        // Attempting an unlock upgrade after completion is a no-op
        assert!(!db.upgrade_status(user, ch, ProgressStatus::Unlocked).unwrap());
        assert_eq!(pair_status(&db, user, ch), ProgressStatus::Completed);
    }

    #[test]
    fn test_unlock_cascade_targets_only_the_dependent() {
        let (db, _dir) = test_db();
        let first = insert_challenge(&db, "first", 10, "FLAG{first}", 1, None, true);
        let second = insert_challenge(&db, "second", 20, "FLAG{second}", 2, Some(first), false);
        let unrelated = insert_challenge(&db, "unrelated", 30, "FLAG{other}", 3, None, false);
        let user = insert_user(&db, "agent_chain");

        db.complete_challenge(user, first).unwrap();

        assert_eq!(pair_status(&db, user, second), ProgressStatus::Unlocked);
        assert_eq!(pair_status(&db, user, unrelated), ProgressStatus::Locked);
    }

    #[test]
    fn test_cascade_never_downgrades_completed_successor() {
        let (db, _dir) = test_db();
        let first = insert_challenge(&db, "first", 10, "FLAG{first}", 1, None, true);
        let second = insert_challenge(&db, "second", 20, "FLAG{second}", 2, Some(first), true);
        let user = insert_user(&db, "agent_nodown");

        db.complete_challenge(user, second).unwrap();
        db.complete_challenge(user, first).unwrap();

        assert_eq!(pair_status(&db, user, second), ProgressStatus::Completed);
    }

    #[test]
    fn test_double_completion_scores_once() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "only", 40, "FLAG{only}", 1, None, true);
        let user = insert_user(&db, "agent_twice");

        db.complete_challenge(user, ch).unwrap();
        db.complete_challenge(user, ch).unwrap();

        let u = db.get_user_by_id(user).unwrap().unwrap();
        assert_eq!(u.total_score, 40);
        assert_eq!(u.current_level, 1);

        // Narrative log appended exactly once
        assert_eq!(db.get_user_logs(user).unwrap().len(), 1);
    }

    #[test]
    fn test_completion_updates_aggregates() {
        let (db, _dir) = test_db();
        let c1 = insert_challenge(&db, "c1", 10, "FLAG{a}", 1, None, true);
        let c2 = insert_challenge(&db, "c2", 30, "FLAG{b}", 2, None, true);
        insert_challenge(&db, "c3", 60, "FLAG{c}", 3, None, false);
        let user = insert_user(&db, "agent_agg");

        db.complete_challenge(user, c1).unwrap();
        db.complete_challenge(user, c2).unwrap();

        let u = db.get_user_by_id(user).unwrap().unwrap();
        assert_eq!(u.total_score, 40);
        assert_eq!(u.current_level, 2);
        assert!((u.total_progress - 66.67).abs() < 1e-9);
    }

    #[test]
    fn test_attempts_only_increment_existing_rows() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "only", 10, "FLAG{only}", 1, None, true);
        let user = insert_user(&db, "agent_try");

        db.increment_attempts(user, ch).unwrap();
        let row = db.get_challenge_progress(user, ch).unwrap().unwrap();
        assert_eq!(row.attempts, 1);

        // No row for a ghost pair - nothing is created
        db.increment_attempts(user, 9999).unwrap();
        assert!(db.get_challenge_progress(user, 9999).unwrap().is_none());
    }

    #[test]
    fn test_completing_missing_challenge_fails_cleanly() {
        let (db, _dir) = test_db();
        let user = insert_user(&db, "agent_ghost");
        let err = db.complete_challenge(user, 12345).unwrap_err();
        assert!(matches!(err, rusqlite::Error::QueryReturnedNoRows));
    }

    fn snapshot(entries: &[(i64, bool, bool)]) -> HashMap<String, LocalProgressEntry> {
        entries
            .iter()
            .map(|(id, completed, unlocked)| {
                (
                    id.to_string(),
                    LocalProgressEntry {
                        completed: *completed,
                        unlocked: *unlocked,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_merge_applies_higher_ranked_local_status() {
        let (db, _dir) = test_db();
        let c1 = insert_challenge(&db, "c1", 10, "FLAG{a}", 1, None, true);
        let c2 = insert_challenge(&db, "c2", 20, "FLAG{b}", 2, None, false);
        let user = insert_user(&db, "agent_merge");

        let local = snapshot(&[(c1, true, true), (c2, false, true)]);
        let applied = db.sync_local_progress(user, &local);
        assert_eq!(applied, 2);

        assert_eq!(pair_status(&db, user, c1), ProgressStatus::Completed);
        assert_eq!(pair_status(&db, user, c2), ProgressStatus::Unlocked);

        // Completion path ran scoring and narrative logging
        let u = db.get_user_by_id(user).unwrap().unwrap();
        assert_eq!(u.total_score, 10);
        assert_eq!(db.get_user_logs(user).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (db, _dir) = test_db();
        let c1 = insert_challenge(&db, "c1", 10, "FLAG{a}", 1, None, true);
        let c2 = insert_challenge(&db, "c2", 20, "FLAG{b}", 2, None, false);
        let user = insert_user(&db, "agent_idem");

        let local = snapshot(&[(c1, true, true), (c2, false, true)]);
        db.sync_local_progress(user, &local);
        let second_run = db.sync_local_progress(user, &local);
        assert_eq!(second_run, 0);

        let u = db.get_user_by_id(user).unwrap().unwrap();
        assert_eq!(u.total_score, 10);
        assert_eq!(db.get_user_logs(user).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_never_downgrades_server_state() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "done", 10, "FLAG{done}", 1, None, true);
        let user = insert_user(&db, "agent_keep");
        db.complete_challenge(user, ch).unwrap();

        // Local snapshot only says "unlocked" - server stays completed
        let local = snapshot(&[(ch, false, true)]);
        let applied = db.sync_local_progress(user, &local);
        assert_eq!(applied, 0);
        assert_eq!(pair_status(&db, user, ch), ProgressStatus::Completed);
    }

    #[test]
    fn test_merge_skips_invalid_entries() {
        let (db, _dir) = test_db();
        let ch = insert_challenge(&db, "real", 10, "FLAG{real}", 1, None, true);
        let user = insert_user(&db, "agent_skip");

        let mut local = snapshot(&[(ch, true, true)]);
        // Unknown challenge id and garbage key are dropped, not fatal
        local.insert("99999".to_string(), LocalProgressEntry {
            completed: true,
            unlocked: true,
        });
        local.insert("not-a-number".to_string(), LocalProgressEntry::default());

        let applied = db.sync_local_progress(user, &local);
        assert_eq!(applied, 1);
        assert_eq!(pair_status(&db, user, ch), ProgressStatus::Completed);
    }
}
