//! Database operations for the `discovered_easter_eggs` table. Discovery is
//! idempotent per (user, challenge, code); re-discovery refreshes the
//! timestamp instead of duplicating the row.

use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use crate::db::Database;
use crate::models::progress::LocalEasterEgg;

/// A discovery joined with its challenge title for display
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredEasterEgg {
    pub id: i64,
    pub challenge_id: i64,
    pub challenge_title: String,
    pub easter_egg_code: String,
    pub discovered_at: String,
}

impl Database {
    /// Record a discovery. Duplicate discoveries update `discovered_at` only.
    pub fn discover_easter_egg(
        &self,
        user_id: i64,
        challenge_id: i64,
        code: &str,
    ) -> rusqlite::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO discovered_easter_eggs
                (user_id, challenge_id, easter_egg_code, discovered_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, challenge_id, easter_egg_code)
             DO UPDATE SET discovered_at = ?4",
            params![user_id, challenge_id, code, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_user_easter_eggs(&self, user_id: i64) -> rusqlite::Result<Vec<DiscoveredEasterEgg>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ee.id, ee.challenge_id, c.title, ee.easter_egg_code, ee.discovered_at
             FROM discovered_easter_eggs ee
             JOIN challenges c ON ee.challenge_id = c.id
             WHERE ee.user_id = ?1
             ORDER BY ee.discovered_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(DiscoveredEasterEgg {
                id: row.get(0)?,
                challenge_id: row.get(1)?,
                challenge_title: row.get(2)?,
                easter_egg_code: row.get(3)?,
                discovered_at: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Merge client-held anonymous discoveries. Each entry is re-validated
    /// against the challenge's configured code; entries that don't match are
    /// silently dropped. Returns the number of entries applied.
    pub fn sync_local_easter_eggs(&self, user_id: i64, local: &[LocalEasterEgg]) -> usize {
        let mut applied = 0;
        for egg in local {
            let configured = match self.get_challenge(egg.challenge_id) {
                Ok(Some(challenge)) => challenge.easter_egg,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!(
                        "Easter egg merge: failed to read challenge {} for user {}: {}",
                        egg.challenge_id,
                        user_id,
                        e
                    );
                    continue;
                }
            };

            match configured {
                Some(code) if code == egg.code => {
                    match self.discover_easter_egg(user_id, egg.challenge_id, &egg.code) {
                        Ok(()) => applied += 1,
                        Err(e) => log::warn!(
                            "Easter egg merge: failed to record challenge {} for user {}: {}",
                            egg.challenge_id,
                            user_id,
                            e
                        ),
                    }
                }
                _ => {}
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, test_db};
    use crate::db::tables::challenges::NewChallenge;
    use crate::security::password::hash_secret;

    fn insert_egg_challenge(db: &crate::db::Database, title: &str, egg: Option<&str>) -> i64 {
        db.create_challenge(&NewChallenge {
            title: title.to_string(),
            description: String::new(),
            category: String::new(),
            difficulty: String::new(),
            points: 10,
            flag_hash: hash_secret("FLAG{x}").unwrap(),
            hint_text: String::new(),
            story_chapter: String::new(),
            story_order: 1,
            unlock_after_challenge_id: None,
            is_unlocked_default: true,
            easter_egg: egg.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn test_discovery_is_idempotent() {
        let (db, _dir) = test_db();
        let ch = insert_egg_challenge(&db, "hidden", Some("KONAMI"));
        let user = insert_user(&db, "agent_egg");

        db.discover_easter_egg(user, ch, "KONAMI").unwrap();
        db.discover_easter_egg(user, ch, "KONAMI").unwrap();

        let eggs = db.get_user_easter_eggs(user).unwrap();
        assert_eq!(eggs.len(), 1);
        assert_eq!(eggs[0].easter_egg_code, "KONAMI");
        assert_eq!(eggs[0].challenge_title, "hidden");
    }

    #[test]
    fn test_merge_validates_against_configured_code() {
        let (db, _dir) = test_db();
        let ch = insert_egg_challenge(&db, "hidden", Some("KONAMI"));
        let bare = insert_egg_challenge(&db, "bare", None);
        let user = insert_user(&db, "agent_sync");

        let local = vec![
            LocalEasterEgg {
                challenge_id: ch,
                code: "KONAMI".to_string(),
            },
            // Wrong code, challenge without an egg, unknown challenge
            LocalEasterEgg {
                challenge_id: ch,
                code: "WRONG".to_string(),
            },
            LocalEasterEgg {
                challenge_id: bare,
                code: "KONAMI".to_string(),
            },
            LocalEasterEgg {
                challenge_id: 9999,
                code: "KONAMI".to_string(),
            },
        ];

        let applied = db.sync_local_easter_eggs(user, &local);
        assert_eq!(applied, 1);
        assert_eq!(db.get_user_easter_eggs(user).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_duplicates_collapse_to_one_row() {
        let (db, _dir) = test_db();
        let ch = insert_egg_challenge(&db, "hidden", Some("KONAMI"));
        let user = insert_user(&db, "agent_dupe");

        let entry = LocalEasterEgg {
            challenge_id: ch,
            code: "KONAMI".to_string(),
        };
        let local = vec![entry.clone(), entry.clone(), entry];

        db.sync_local_easter_eggs(user, &local);
        assert_eq!(db.get_user_easter_eggs(user).unwrap().len(), 1);
    }
}
