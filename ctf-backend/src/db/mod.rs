//! Database handle and schema.
//!
//! `Database` wraps a single SQLite connection behind a mutex; domain-specific
//! methods live in `impl Database` blocks under `tables/`. Multi-statement
//! procedures (completion, merge, cascade deletes) run inside explicit
//! `rusqlite` transactions opened by the public method and passed down to
//! helpers - there is no nested-transaction detection at runtime.

pub mod tables;

use rusqlite::{Connection, Result as SqliteResult};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(database_url: &str) -> SqliteResult<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(database_url)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init(&self) -> SqliteResult<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                total_score INTEGER NOT NULL DEFAULT 0,
                total_progress REAL NOT NULL DEFAULT 0,
                current_level INTEGER NOT NULL DEFAULT 0,
                agent_rank TEXT NOT NULL DEFAULT 'Rookie',
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_login TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS challenges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                difficulty TEXT NOT NULL DEFAULT '',
                points INTEGER NOT NULL,
                flag_hash TEXT NOT NULL,
                hint_text TEXT NOT NULL DEFAULT '',
                story_chapter TEXT NOT NULL DEFAULT '',
                story_order INTEGER NOT NULL DEFAULT 0,
                unlock_after_challenge_id INTEGER,
                is_unlocked_default INTEGER NOT NULL DEFAULT 0,
                easter_egg TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS user_progress (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'locked',
                attempts INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, challenge_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS agent_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                log_entry TEXT NOT NULL,
                log_timestamp TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS discovered_easter_eggs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                easter_egg_code TEXT NOT NULL,
                discovered_at TEXT NOT NULL,
                UNIQUE(user_id, challenge_id, easter_egg_code)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT UNIQUE NOT NULL,
                user_id INTEGER,
                csrf_token TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;
    use crate::models::ProgressStatus;
    use crate::security::password::hash_secret;
    use tempfile::TempDir;

    /// Fresh database in a temp directory; the TempDir must outlive the db.
    pub fn test_db() -> (Database, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("test.db");
        let db = Database::new(path.to_str().unwrap()).expect("test db");
        (db, dir)
    }

    /// Insert a challenge with a real hash for `flag` and return its id
    pub fn insert_challenge(
        db: &Database,
        title: &str,
        points: i64,
        flag: &str,
        story_order: i64,
        unlock_after: Option<i64>,
        unlocked_default: bool,
    ) -> i64 {
        let flag_hash = hash_secret(flag).expect("hash flag");
        db.create_challenge(&crate::db::tables::challenges::NewChallenge {
            title: title.to_string(),
            description: String::new(),
            category: "test".to_string(),
            difficulty: "easy".to_string(),
            points,
            flag_hash,
            hint_text: String::new(),
            story_chapter: format!("Chapter for {}", title),
            story_order,
            unlock_after_challenge_id: unlock_after,
            is_unlocked_default: unlocked_default,
            easter_egg: None,
        })
        .expect("create challenge")
    }

    /// Register a user with hashed credentials and initialized progress rows
    pub fn insert_user(db: &Database, username: &str) -> i64 {
        let password_hash = hash_secret("secret123").expect("hash password");
        let user_id = db
            .create_user(username, &format!("{}@example.com", username), &password_hash)
            .expect("create user");
        db.initialize_user_progress(user_id).expect("init progress");
        user_id
    }

    pub fn pair_status(db: &Database, user_id: i64, challenge_id: i64) -> ProgressStatus {
        db.get_challenge_progress(user_id, challenge_id)
            .expect("progress query")
            .map(|p| p.status)
            .unwrap_or(ProgressStatus::Locked)
    }
}
