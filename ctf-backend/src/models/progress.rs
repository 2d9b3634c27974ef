use serde::{Deserialize, Serialize};

/// Per-(user, challenge) state. Transitions only move forward:
/// locked -> unlocked -> completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Locked,
    Unlocked,
    Completed,
}

impl ProgressStatus {
    /// Ranking used by the merge rule: higher rank always wins
    pub fn rank(self) -> u8 {
        match self {
            ProgressStatus::Locked => 1,
            ProgressStatus::Unlocked => 2,
            ProgressStatus::Completed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Locked => "locked",
            ProgressStatus::Unlocked => "unlocked",
            ProgressStatus::Completed => "completed",
        }
    }

    /// Parse a stored status; unknown values degrade to locked
    pub fn parse(s: &str) -> Self {
        match s {
            "unlocked" => ProgressStatus::Unlocked,
            "completed" => ProgressStatus::Completed,
            _ => ProgressStatus::Locked,
        }
    }
}

/// A row from the `user_progress` table
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRow {
    pub id: i64,
    pub user_id: i64,
    pub challenge_id: i64,
    pub status: ProgressStatus,
    pub attempts: i64,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

/// Client-held progress for one challenge while the user was anonymous
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalProgressEntry {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub unlocked: bool,
}

impl LocalProgressEntry {
    /// Derived status: completed beats unlocked beats locked
    pub fn status(&self) -> ProgressStatus {
        if self.completed {
            ProgressStatus::Completed
        } else if self.unlocked {
            ProgressStatus::Unlocked
        } else {
            ProgressStatus::Locked
        }
    }
}

/// Client-held easter egg discovery record
#[derive(Debug, Clone, Deserialize)]
pub struct LocalEasterEgg {
    #[serde(alias = "challengeId")]
    pub challenge_id: i64,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ordering() {
        assert!(ProgressStatus::Completed.rank() > ProgressStatus::Unlocked.rank());
        assert!(ProgressStatus::Unlocked.rank() > ProgressStatus::Locked.rank());
    }

    #[test]
    fn test_parse_round_trips() {
        for status in [
            ProgressStatus::Locked,
            ProgressStatus::Unlocked,
            ProgressStatus::Completed,
        ] {
            assert_eq!(ProgressStatus::parse(status.as_str()), status);
        }
        assert_eq!(ProgressStatus::parse("garbage"), ProgressStatus::Locked);
    }

    #[test]
    fn test_local_entry_status_derivation() {
        let completed = LocalProgressEntry {
            completed: true,
            unlocked: true,
        };
        assert_eq!(completed.status(), ProgressStatus::Completed);

        let unlocked = LocalProgressEntry {
            completed: false,
            unlocked: true,
        };
        assert_eq!(unlocked.status(), ProgressStatus::Unlocked);

        assert_eq!(LocalProgressEntry::default().status(), ProgressStatus::Locked);
    }
}
