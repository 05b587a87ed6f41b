//! Conflict snapshot model

use serde::{Deserialize, Serialize};

use super::{Session, WordRecord};

/// Both versions of a session that could not be reconciled automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSnapshot {
    pub local: Session,
    pub remote: Session,
    pub local_words: Vec<WordRecord>,
    pub remote_words: Vec<WordRecord>,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
}

impl ConflictSnapshot {
    /// Difference in modification time, positive when local is newer
    #[must_use]
    pub const fn time_delta_ms(&self) -> i64 {
        self.local.timestamp - self.remote.timestamp
    }
}

/// A user's answer to a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    /// Push the local copy over the remote one
    KeepLocal,
    /// Replace the local copy with the remote one
    KeepRemote,
}
