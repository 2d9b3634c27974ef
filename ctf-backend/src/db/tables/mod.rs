//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table
//! group.

pub mod agent_logs; // agent_logs (narrative story progression)
pub mod challenges; // challenges (definitions + flag verification)
pub mod easter_eggs; // discovered_easter_eggs (+ local merge)
pub mod progress; // user_progress (state machine, completion, local merge)
pub mod sessions; // sessions (anonymous + authenticated, CSRF tokens)
pub mod users; // users (accounts, credentials, aggregates)
