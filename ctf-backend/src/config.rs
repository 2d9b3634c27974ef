use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const DEBUG_MODE: &str = "CTF_DEBUG_MODE";
    pub const SESSION_LIFETIME_HOURS: &str = "CTF_SESSION_LIFETIME_HOURS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const DATABASE_URL: &str = "./.db/ctf.db";
    /// 7 days
    pub const SESSION_LIFETIME_HOURS: i64 = 24 * 7;
    pub const PASSWORD_MIN_LENGTH: usize = 6;
}

/// Bonus awarded for discovering an easter egg
pub const EASTER_EGG_BONUS_POINTS: i64 = 50;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub debug_mode: bool,
    pub session_lifetime_hours: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            debug_mode: debug_mode(),
            session_lifetime_hours: env::var(env_vars::SESSION_LIFETIME_HOURS)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::SESSION_LIFETIME_HOURS),
        }
    }
}

/// Whether detailed error messages may be surfaced to clients.
/// Must stay off in production - internal detail is logged either way.
pub fn debug_mode() -> bool {
    env::var(env_vars::DEBUG_MODE)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}
