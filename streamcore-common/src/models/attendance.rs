use serde::{Deserialize, Serialize};
use crate::models::platform::Platform;

/// Session dedup key: lowercase nickname plus platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendanceKey {
    pub nickname: String,
    pub platform: Platform,
}

impl AttendanceKey {
    pub fn new(nickname: &str, platform: Platform) -> Self {
        Self {
            nickname: nickname.trim().to_lowercase(),
            platform,
        }
    }
}

/// Persistent attendance total, accumulated across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub nickname: String,
    pub platform: Platform,
    pub total_count: u64,
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceOutcome {
    /// First registration this session; carries the new persisted total.
    Accepted { total: u64 },
    AlreadyRegistered,
}
