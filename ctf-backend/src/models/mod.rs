pub mod challenge;
pub mod progress;
pub mod session;
pub mod user;

pub use challenge::{AdminChallengeDetail, Challenge, ChallengeWithStatus};
pub use progress::{LocalEasterEgg, LocalProgressEntry, ProgressRow, ProgressStatus};
pub use session::Session;
pub use user::{User, UserStatistics};
