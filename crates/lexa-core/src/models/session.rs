//! Session model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ConflictSnapshot;

/// A unique identifier for a session, using UUID v7 (time-sortable)
///
/// Generated on the client and kept identical in the remote store, so the
/// same id can be upserted any number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A batch of vocabulary words tested together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Client-generated identifier, stable across stores
    pub id: SessionId,
    /// Creation/modification timestamp (Unix ms)
    pub timestamp: i64,
    /// Number of words in the session
    pub word_count: u32,
    /// Number of words the user intended to collect
    pub target_count: u32,
    /// Library the words were drawn from
    pub library_tag: String,
    /// Soft delete flag for sync
    #[serde(default)]
    pub deleted: bool,
}

impl Session {
    /// Create a new session stamped with the current time
    #[must_use]
    pub fn new(library_tag: impl Into<String>, target_count: u32) -> Self {
        Self {
            id: SessionId::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            word_count: 0,
            target_count,
            library_tag: library_tag.into(),
            deleted: false,
        }
    }

    /// Mark the session modified now
    pub fn touch(&mut self) {
        let now = chrono::Utc::now().timestamp_millis();
        // never move backwards, the resolver compares timestamps
        self.timestamp = now.max(self.timestamp.saturating_add(1));
    }
}

/// Per-session synchronization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local and remote agree
    Synced,
    /// Local changes not yet pushed
    #[default]
    Pending,
    /// Reconciliation in progress
    Syncing,
    /// Last attempt failed; waiting for a retry trigger
    Failed,
    /// Diverged; waiting for a user decision
    Conflict,
}

impl SyncStatus {
    /// Whether a batch sync pass should pick the session up
    #[must_use]
    pub const fn needs_sync(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session as held by the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWithSync {
    #[serde(flatten)]
    pub session: Session,
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Last sync attempt (Unix ms)
    #[serde(default)]
    pub last_sync_attempt: Option<i64>,
    /// Both sides of an unresolved conflict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictSnapshot>,
}

impl SessionWithSync {
    #[must_use]
    pub const fn new(session: Session, sync_status: SyncStatus) -> Self {
        Self {
            session,
            sync_status,
            last_sync_attempt: None,
            conflict: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.session.id
    }
}
